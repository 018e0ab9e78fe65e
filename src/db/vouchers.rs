use crate::config::vouchers::VoucherConfig;
use crate::db::DbPool;
use crate::errors::{Error, Result};
use crate::models::{Voucher, VoucherClaim};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info, instrument, warn};

pub(crate) fn map_voucher_row(row: &Row<'_>) -> rusqlite::Result<Voucher> {
    Ok(Voucher {
        id: row.get(0)?,
        title: row.get(1)?,
        cost_points: row.get(2)?,
        total_quantity: row.get(3)?,
        remaining_quantity: row.get(4)?,
        is_deleted: row.get(5)?,
    })
}

const VOUCHER_COLUMNS: &str = "id, title, cost_points, total_quantity, remaining_quantity, is_deleted";

/// Seeds the voucher catalogue from the TOML configuration.
///
/// An active voucher with the same title is skipped; a soft-deleted one is
/// re-enabled with the configured cost and a full restock; otherwise a new
/// row is inserted.
#[instrument(skip(pool, configs))]
pub async fn seed_initial_vouchers(pool: &DbPool, configs: &[VoucherConfig]) -> Result<()> {
    info!(
        "Starting to seed voucher catalogue. Found {} configurations from TOML.",
        configs.len()
    );
    let mut conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock for seeding".to_string()))?;
    let tx = conn
        .transaction()
        .map_err(|e| Error::Database(format!("Failed to start transaction: {}", e)))?;

    for cfg in configs {
        let active: Option<i64> = tx
            .prepare_cached("SELECT id FROM vouchers WHERE title = ?1 AND is_deleted = FALSE")?
            .query_row(params![cfg.title], |row| row.get(0))
            .optional()?;
        if active.is_some() {
            warn!("ACTIVE voucher '{}' already exists. Skipping.", cfg.title);
            continue;
        }

        let deleted: Option<i64> = tx
            .prepare_cached("SELECT id FROM vouchers WHERE title = ?1 AND is_deleted = TRUE")?
            .query_row(params![cfg.title], |row| row.get(0))
            .optional()?;

        if let Some(id_to_reenable) = deleted {
            info!(
                "Found soft-deleted voucher '{}'. Re-enabling and restocking.",
                cfg.title
            );
            tx.prepare_cached(
                "UPDATE vouchers SET cost_points = ?1, total_quantity = ?2, remaining_quantity = ?2, is_deleted = FALSE
                 WHERE id = ?3",
            )?
            .execute(params![cfg.cost_points, cfg.quantity, id_to_reenable])?;
        } else {
            info!("Inserting NEW voucher '{}'", cfg.title);
            tx.prepare_cached(
                "INSERT INTO vouchers (title, cost_points, total_quantity, remaining_quantity, is_deleted)
                 VALUES (?1, ?2, ?3, ?3, FALSE)",
            )?
            .execute(params![cfg.title, cfg.cost_points, cfg.quantity])?;
        }
    }

    tx.commit()
        .map_err(|e| Error::Database(format!("Failed to commit voucher seeding: {}", e)))?;
    info!("Finished seeding voucher catalogue.");
    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_voucher(pool: &DbPool, voucher_id: i64) -> Result<Option<Voucher>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE id = ?1 AND is_deleted = FALSE"
    ))?;
    let voucher = stmt
        .query_row(params![voucher_id], map_voucher_row)
        .optional()?;
    Ok(voucher)
}

#[instrument(skip(pool))]
pub async fn list_active_vouchers(pool: &DbPool) -> Result<Vec<Voucher>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE is_deleted = FALSE ORDER BY title"
    ))?;
    let vouchers = stmt
        .query_map([], map_voucher_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    debug!("Fetched {} active vouchers.", vouchers.len());
    Ok(vouchers)
}

/// Exchanges EcoPoints for one unit of a voucher, at most once per user.
///
/// All preconditions are validated against current state and the debit, the
/// claim row, and the stock decrement commit together; a failure at any step
/// rolls the whole claim back. Returns the user's balance after the claim.
#[instrument(skip(pool))]
pub async fn claim_voucher(pool: &DbPool, voucher_id: i64, user_id: &str) -> Result<i64> {
    let mut conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock for voucher claim".to_string()))?;
    let tx = conn
        .transaction()
        .map_err(|e| Error::Database(format!("Failed to start claim transaction: {}", e)))?;

    let balance: Option<i64> = tx
        .prepare_cached("SELECT eco_points FROM users WHERE id = ?1")?
        .query_row(params![user_id], |row| row.get(0))
        .optional()?;
    let balance = balance.ok_or_else(|| Error::NotFound {
        entity: "user",
        id: user_id.to_string(),
    })?;

    let voucher = tx
        .prepare_cached(&format!(
            "SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE id = ?1 AND is_deleted = FALSE"
        ))?
        .query_row(params![voucher_id], map_voucher_row)
        .optional()?
        .ok_or_else(|| Error::NotFound {
            entity: "voucher",
            id: voucher_id.to_string(),
        })?;

    let already: Option<i64> = tx
        .prepare_cached("SELECT 1 FROM voucher_claims WHERE voucher_id = ?1 AND user_id = ?2")?
        .query_row(params![voucher_id, user_id], |row| row.get(0))
        .optional()?;
    if already.is_some() {
        return Err(Error::AlreadyClaimed);
    }

    if voucher.remaining_quantity <= 0 {
        return Err(Error::OutOfStock);
    }

    if balance < voucher.cost_points {
        return Err(Error::InsufficientPoints {
            have: balance,
            need: voucher.cost_points,
        });
    }

    let new_balance = balance - voucher.cost_points;
    tx.execute(
        "UPDATE users SET eco_points = eco_points - ?1 WHERE id = ?2",
        params![voucher.cost_points, user_id],
    )?;
    tx.execute(
        "INSERT INTO voucher_claims (voucher_id, user_id, claimed_at) VALUES (?1, ?2, ?3)",
        params![voucher_id, user_id, Utc::now()],
    )?;
    tx.execute(
        "UPDATE vouchers SET remaining_quantity = remaining_quantity - 1 WHERE id = ?1",
        params![voucher_id],
    )?;

    tx.commit()
        .map_err(|e| Error::Database(format!("Failed to commit voucher claim: {}", e)))?;
    info!(
        "User {} claimed voucher {} ('{}') for {} points, balance now {}",
        user_id, voucher_id, voucher.title, voucher.cost_points, new_balance
    );
    Ok(new_balance)
}

/// The claimed-voucher set for a user, newest first.
#[instrument(skip(pool))]
pub async fn claims_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<VoucherClaim>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(
        "SELECT voucher_id, user_id, claimed_at FROM voucher_claims
         WHERE user_id = ?1 ORDER BY claimed_at DESC",
    )?;
    let claims = stmt
        .query_map(params![user_id], |row| {
            Ok(VoucherClaim {
                voucher_id: row.get(0)?,
                user_id: row.get(1)?,
                claimed_at: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{
        direct_insert_voucher, init_test_tracing, setup_test_db, DirectVoucherArgs,
    };
    use crate::db::users::{create_user, credit_points, get_user};

    async fn user_with_points(pool: &DbPool, id: &str, points: i64) -> Result<()> {
        create_user(pool, id, id).await?;
        if points > 0 {
            credit_points(pool, id, id, points).await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_skips_active_and_reenables_deleted() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;

        let configs = vec![
            VoucherConfig {
                title: "Campus cafe RM5".to_string(),
                cost_points: 30,
                quantity: 10,
            },
            VoucherConfig {
                title: "Bookstore 10% off".to_string(),
                cost_points: 20,
                quantity: 5,
            },
        ];
        seed_initial_vouchers(&db_pool, &configs).await?;
        assert_eq!(list_active_vouchers(&db_pool).await?.len(), 2);

        // Re-seeding skips the active entries
        seed_initial_vouchers(&db_pool, &configs).await?;
        assert_eq!(list_active_vouchers(&db_pool).await?.len(), 2);

        // Soft-delete one, then re-seed with a new cost: re-enabled and restocked
        {
            let conn = db_pool.lock().unwrap();
            conn.execute(
                "UPDATE vouchers SET is_deleted = TRUE, remaining_quantity = 0 WHERE title = ?1",
                params!["Campus cafe RM5"],
            )?;
        }
        let updated = vec![VoucherConfig {
            title: "Campus cafe RM5".to_string(),
            cost_points: 25,
            quantity: 8,
        }];
        seed_initial_vouchers(&db_pool, &updated).await?;
        let vouchers = list_active_vouchers(&db_pool).await?;
        let cafe = vouchers
            .iter()
            .find(|v| v.title == "Campus cafe RM5")
            .expect("re-enabled voucher missing");
        assert_eq!(cafe.cost_points, 25);
        assert_eq!(cafe.remaining_quantity, 8);
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_deducts_points_and_stock() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        user_with_points(&db_pool, "alice", 50).await?;
        let voucher_id = {
            let conn = db_pool.lock().unwrap();
            direct_insert_voucher(&DirectVoucherArgs {
                conn: &conn,
                title: "Cafe RM5",
                cost_points: 30,
                total_quantity: 1,
                remaining_quantity: 1,
                is_deleted: false,
            })?
        };

        let new_balance = claim_voucher(&db_pool, voucher_id, "alice").await?;
        assert_eq!(new_balance, 20);

        let user = get_user(&db_pool, "alice").await?.unwrap();
        assert_eq!(user.eco_points, 20);

        let voucher = get_voucher(&db_pool, voucher_id).await?.unwrap();
        assert_eq!(voucher.remaining_quantity, 0);

        let claimed = claims_for_user(&db_pool, "alice").await?;
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].voucher_id, voucher_id);
        Ok(())
    }

    #[tokio::test]
    async fn test_second_claim_rejected_and_balance_unchanged() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        user_with_points(&db_pool, "alice", 50).await?;
        let voucher_id = {
            let conn = db_pool.lock().unwrap();
            direct_insert_voucher(&DirectVoucherArgs {
                conn: &conn,
                title: "Cafe RM5",
                cost_points: 30,
                total_quantity: 5,
                remaining_quantity: 5,
                is_deleted: false,
            })?
        };

        claim_voucher(&db_pool, voucher_id, "alice").await?;
        let second = claim_voucher(&db_pool, voucher_id, "alice").await;
        assert!(matches!(second, Err(Error::AlreadyClaimed)));

        let user = get_user(&db_pool, "alice").await?.unwrap();
        assert_eq!(user.eco_points, 20, "balance unchanged by rejected claim");
        let voucher = get_voucher(&db_pool, voucher_id).await?.unwrap();
        assert_eq!(voucher.remaining_quantity, 4, "stock unchanged by rejected claim");
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_with_insufficient_points() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        user_with_points(&db_pool, "bob", 10).await?;
        let voucher_id = {
            let conn = db_pool.lock().unwrap();
            direct_insert_voucher(&DirectVoucherArgs {
                conn: &conn,
                title: "Cafe RM5",
                cost_points: 30,
                total_quantity: 5,
                remaining_quantity: 5,
                is_deleted: false,
            })?
        };

        let result = claim_voucher(&db_pool, voucher_id, "bob").await;
        assert!(matches!(
            result,
            Err(Error::InsufficientPoints { have: 10, need: 30 })
        ));
        let user = get_user(&db_pool, "bob").await?.unwrap();
        assert_eq!(user.eco_points, 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_out_of_stock_even_with_points() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        user_with_points(&db_pool, "carol", 100).await?;
        let voucher_id = {
            let conn = db_pool.lock().unwrap();
            direct_insert_voucher(&DirectVoucherArgs {
                conn: &conn,
                title: "Sold out",
                cost_points: 30,
                total_quantity: 5,
                remaining_quantity: 0,
                is_deleted: false,
            })?
        };

        let result = claim_voucher(&db_pool, voucher_id, "carol").await;
        assert!(matches!(result, Err(Error::OutOfStock)));
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_missing_user_and_voucher() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        user_with_points(&db_pool, "dave", 50).await?;
        let voucher_id = {
            let conn = db_pool.lock().unwrap();
            direct_insert_voucher(&DirectVoucherArgs {
                conn: &conn,
                title: "Cafe RM5",
                cost_points: 30,
                total_quantity: 1,
                remaining_quantity: 1,
                is_deleted: false,
            })?
        };

        let no_user = claim_voucher(&db_pool, voucher_id, "nobody").await;
        assert!(matches!(
            no_user,
            Err(Error::NotFound { entity: "user", .. })
        ));

        let no_voucher = claim_voucher(&db_pool, 9999, "dave").await;
        assert!(matches!(
            no_voucher,
            Err(Error::NotFound { entity: "voucher", .. })
        ));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_claims_of_last_unit() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        user_with_points(&db_pool, "alice", 50).await?;
        user_with_points(&db_pool, "bob", 50).await?;
        let voucher_id = {
            let conn = db_pool.lock().unwrap();
            direct_insert_voucher(&DirectVoucherArgs {
                conn: &conn,
                title: "Last unit",
                cost_points: 30,
                total_quantity: 1,
                remaining_quantity: 1,
                is_deleted: false,
            })?
        };

        let pool_a = std::sync::Arc::clone(&db_pool);
        let pool_b = std::sync::Arc::clone(&db_pool);
        let a = tokio::spawn(async move { claim_voucher(&pool_a, voucher_id, "alice").await });
        let b = tokio::spawn(async move { claim_voucher(&pool_b, voucher_id, "bob").await });
        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());

        let successes = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one claim of the last unit succeeds");
        let loser = if ra.is_ok() { rb } else { ra };
        assert!(matches!(loser, Err(Error::OutOfStock)));

        let voucher = get_voucher(&db_pool, voucher_id).await?.unwrap();
        assert_eq!(voucher.remaining_quantity, 0);
        Ok(())
    }
}
