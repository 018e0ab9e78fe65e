use crate::db::DbPool;
use crate::errors::{Error, Result};
use crate::models::User;
use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info, instrument};

pub(crate) fn map_user_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        eco_points: row.get(2)?,
        last_checkin: row.get(3)?,
        checkin_streak: row.get(4)?,
    })
}

/// Registers a user if no row with this id exists yet.
///
/// Returns `true` when a new row was inserted, `false` when the user was
/// already registered.
#[instrument(skip(pool))]
pub async fn create_user(pool: &DbPool, user_id: &str, name: &str) -> Result<bool> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let rows = conn.execute(
        "INSERT INTO users (id, name, eco_points, checkin_streak) VALUES (?1, ?2, 0, 0)
         ON CONFLICT(id) DO NOTHING",
        params![user_id, name],
    )?;
    if rows > 0 {
        info!("Registered user '{}' ({})", name, user_id);
    } else {
        debug!("User {} already registered, skipping insert", user_id);
    }
    Ok(rows > 0)
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &DbPool, user_id: &str) -> Result<Option<User>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, eco_points, last_checkin, checkin_streak FROM users WHERE id = ?1",
    )?;
    let user = stmt
        .query_row(params![user_id], map_user_row)
        .optional()?;
    Ok(user)
}

/// Credits EcoPoints inside an already-open transaction.
///
/// A missing user row is created holding the credited amount, so reward
/// disbursement never fails on an unregistered counterparty.
pub(crate) fn credit_points_in_tx(
    tx: &rusqlite::Transaction<'_>,
    user_id: &str,
    name: &str,
    amount: i64,
) -> Result<()> {
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }
    tx.execute(
        "INSERT INTO users (id, name, eco_points, checkin_streak) VALUES (?1, ?2, ?3, 0)
         ON CONFLICT(id) DO UPDATE SET eco_points = eco_points + excluded.eco_points",
        params![user_id, name, amount],
    )?;
    Ok(())
}

/// Unconditionally credits EcoPoints to a user, creating the user row with
/// the given balance if it does not exist yet.
#[instrument(skip(pool))]
pub async fn credit_points(pool: &DbPool, user_id: &str, name: &str, amount: i64) -> Result<()> {
    let mut conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock for credit".to_string()))?;
    let tx = conn
        .transaction()
        .map_err(|e| Error::Database(format!("Failed to start transaction for credit: {}", e)))?;
    credit_points_in_tx(&tx, user_id, name, amount)?;
    tx.commit()
        .map_err(|e| Error::Database(format!("Failed to commit credit: {}", e)))?;
    info!("Credited {} EcoPoints to user {}", amount, user_id);
    Ok(())
}

/// Outcome of a daily check-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckinOutcome {
    /// True when the user had already checked in today; nothing was awarded.
    pub already_checked_in: bool,
    pub streak: i64,
    pub points_awarded: i64,
}

/// Awards the daily check-in point, at most once per calendar day (UTC).
///
/// The streak continues when the previous check-in was yesterday and resets
/// to 1 after any gap. The check-in date, streak, and balance move in one
/// transaction.
#[instrument(skip(pool))]
pub async fn daily_checkin(pool: &DbPool, user_id: &str, points: i64) -> Result<CheckinOutcome> {
    let mut conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock for check-in".to_string()))?;
    let tx = conn
        .transaction()
        .map_err(|e| Error::Database(format!("Failed to start transaction for check-in: {}", e)))?;

    let user = tx
        .prepare_cached(
            "SELECT id, name, eco_points, last_checkin, checkin_streak FROM users WHERE id = ?1",
        )?
        .query_row(params![user_id], map_user_row)
        .optional()?
        .ok_or_else(|| Error::NotFound {
            entity: "user",
            id: user_id.to_string(),
        })?;

    let today = Utc::now().date_naive();
    if user.last_checkin == Some(today) {
        debug!("User {} already checked in on {}", user_id, today);
        return Ok(CheckinOutcome {
            already_checked_in: true,
            streak: user.checkin_streak,
            points_awarded: 0,
        });
    }

    let yesterday = today - Duration::days(1);
    let streak = if user.last_checkin == Some(yesterday) {
        user.checkin_streak + 1
    } else {
        1
    };

    tx.execute(
        "UPDATE users SET eco_points = eco_points + ?1, last_checkin = ?2, checkin_streak = ?3
         WHERE id = ?4",
        params![points, today, streak, user_id],
    )?;
    tx.commit()
        .map_err(|e| Error::Database(format!("Failed to commit check-in: {}", e)))?;

    info!(
        "Check-in for user {}: +{} EcoPoints, streak now {}",
        user_id, points, streak
    );
    Ok(CheckinOutcome {
        already_checked_in: false,
        streak,
        points_awarded: points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{init_test_tracing, set_last_checkin_for_test, setup_test_db};

    #[tokio::test]
    async fn test_create_and_get_user() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;

        let created = create_user(&db_pool, "u1", "Aina").await?;
        assert!(created);
        let again = create_user(&db_pool, "u1", "Aina").await?;
        assert!(!again, "second registration should be a no-op");

        let user = get_user(&db_pool, "u1").await?.expect("user not found");
        assert_eq!(user.name, "Aina");
        assert_eq!(user.eco_points, 0);
        assert_eq!(user.checkin_streak, 0);
        assert!(user.last_checkin.is_none());

        assert!(get_user(&db_pool, "missing").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_credit_creates_missing_user_with_balance() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;

        credit_points(&db_pool, "ghost", "Ghost", 25).await?;
        let user = get_user(&db_pool, "ghost").await?.expect("user not found");
        assert_eq!(user.eco_points, 25, "missing user is created with the credited balance");

        credit_points(&db_pool, "ghost", "Ghost", 10).await?;
        let user = get_user(&db_pool, "ghost").await?.unwrap();
        assert_eq!(user.eco_points, 35);
        Ok(())
    }

    #[tokio::test]
    async fn test_credit_rejects_non_positive_amounts() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        create_user(&db_pool, "u1", "Aina").await?;

        let zero = credit_points(&db_pool, "u1", "Aina", 0).await;
        assert!(matches!(zero, Err(Error::InvalidAmount { amount: 0 })));
        let negative = credit_points(&db_pool, "u1", "Aina", -5).await;
        assert!(matches!(negative, Err(Error::InvalidAmount { amount: -5 })));

        let user = get_user(&db_pool, "u1").await?.unwrap();
        assert_eq!(user.eco_points, 0, "balance untouched by rejected credits");
        Ok(())
    }

    #[tokio::test]
    async fn test_first_checkin_starts_streak() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        create_user(&db_pool, "u1", "Aina").await?;

        let outcome = daily_checkin(&db_pool, "u1", 1).await?;
        assert!(!outcome.already_checked_in);
        assert_eq!(outcome.streak, 1);
        assert_eq!(outcome.points_awarded, 1);

        let user = get_user(&db_pool, "u1").await?.unwrap();
        assert_eq!(user.eco_points, 1);
        assert_eq!(user.last_checkin, Some(Utc::now().date_naive()));
        Ok(())
    }

    #[tokio::test]
    async fn test_checkin_is_idempotent_within_a_day() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        create_user(&db_pool, "u1", "Aina").await?;

        daily_checkin(&db_pool, "u1", 1).await?;
        let second = daily_checkin(&db_pool, "u1", 1).await?;
        assert!(second.already_checked_in);
        assert_eq!(second.points_awarded, 0);

        let user = get_user(&db_pool, "u1").await?.unwrap();
        assert_eq!(user.eco_points, 1, "no double award on the same day");
        Ok(())
    }

    #[tokio::test]
    async fn test_checkin_streak_continues_from_yesterday() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        create_user(&db_pool, "u1", "Aina").await?;

        let yesterday = Utc::now().date_naive() - Duration::days(1);
        {
            let conn = db_pool.lock().unwrap();
            set_last_checkin_for_test(&conn, "u1", yesterday, 4)?;
        }

        let outcome = daily_checkin(&db_pool, "u1", 1).await?;
        assert_eq!(outcome.streak, 5, "yesterday's check-in extends the streak");
        Ok(())
    }

    #[tokio::test]
    async fn test_checkin_streak_resets_after_gap() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        create_user(&db_pool, "u1", "Aina").await?;

        let three_days_ago = Utc::now().date_naive() - Duration::days(3);
        {
            let conn = db_pool.lock().unwrap();
            set_last_checkin_for_test(&conn, "u1", three_days_ago, 9)?;
        }

        let outcome = daily_checkin(&db_pool, "u1", 1).await?;
        assert_eq!(outcome.streak, 1, "a gap resets the streak");
        Ok(())
    }

    #[tokio::test]
    async fn test_checkin_unknown_user() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        let result = daily_checkin(&db_pool, "nobody", 1).await;
        assert!(matches!(
            result,
            Err(Error::NotFound { entity: "user", .. })
        ));
        Ok(())
    }
}
