use crate::db::DbPool;
use crate::errors::{Error, Result};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, instrument};

/// Retrieves a value from the key-value `system_state` table.
///
/// Used for persistent bookkeeping such as the timestamp of the last
/// auto-completion sweep.
#[instrument(skip(pool))]
pub async fn get_system_state_value(pool: &DbPool, key: &str) -> Result<Option<String>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached("SELECT value FROM system_state WHERE key = ?1")?;
    let value_result: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
    debug!("System state for key '{}': {:?}", key, value_result);
    Ok(value_result)
}

/// Sets or updates a value in the key-value `system_state` table
/// (UPSERT behavior).
#[instrument(skip(pool))]
pub async fn set_system_state_value(pool: &DbPool, key: &str, value: &str) -> Result<()> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    conn.execute(
        "INSERT INTO system_state (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    info!("Set system state: {} = {}", key, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{init_test_tracing, setup_test_db};
    use crate::errors::Result;

    #[tokio::test]
    async fn test_set_get_and_update() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;

        assert!(get_system_state_value(&db_pool, "last_sweep").await?.is_none());

        set_system_state_value(&db_pool, "last_sweep", "2026-08-01T00:00:00Z").await?;
        assert_eq!(
            get_system_state_value(&db_pool, "last_sweep").await?,
            Some("2026-08-01T00:00:00Z".to_string())
        );

        set_system_state_value(&db_pool, "last_sweep", "2026-08-02T00:00:00Z").await?;
        assert_eq!(
            get_system_state_value(&db_pool, "last_sweep").await?,
            Some("2026-08-02T00:00:00Z".to_string())
        );
        Ok(())
    }
}
