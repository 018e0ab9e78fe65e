#![allow(dead_code)]
use crate::db::{schema, DbPool};
use crate::errors::{Error, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")))
        .with_test_writer() // Crucial for `cargo test` output
        .try_init(); // Use try_init to avoid panic if already initialized
}

// Fresh in-memory database with the full schema for each test.
pub(crate) async fn setup_test_db() -> Result<DbPool> {
    let conn = Connection::open_in_memory()
        .map_err(|e| Error::Database(format!("Test DB: Failed to open in-memory: {}", e)))?;
    conn.execute("PRAGMA foreign_keys = ON;", [])
        .map_err(|e| Error::Database(format!("Test DB: Failed to enable foreign keys: {}", e)))?;
    schema::create_tables(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Registers a seller and a buyer and lists one sale item owned by the
/// seller; returns the item id. Shared setup for order and confirmation
/// tests.
pub(crate) async fn setup_marketplace(pool: &DbPool) -> Result<i64> {
    crate::db::users::create_user(pool, "seller", "Sam").await?;
    crate::db::users::create_user(pool, "buyer", "Bea").await?;
    crate::db::items::create_item(pool, "Desk lamp", "seller", crate::models::ItemKind::Sale, Some(15.0)).await
}

pub(crate) struct DirectVoucherArgs<'a> {
    pub(crate) conn: &'a Connection,
    pub(crate) title: &'a str,
    pub(crate) cost_points: i64,
    pub(crate) total_quantity: i64,
    pub(crate) remaining_quantity: i64,
    pub(crate) is_deleted: bool,
}

// Direct insert bypassing the seeding logic, for focused claim tests.
pub(crate) fn direct_insert_voucher(args: &DirectVoucherArgs<'_>) -> Result<i64> {
    let mut stmt = args.conn.prepare_cached(
        "INSERT INTO vouchers (title, cost_points, total_quantity, remaining_quantity, is_deleted)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let id = stmt.insert(params![
        args.title,
        args.cost_points,
        args.total_quantity,
        args.remaining_quantity,
        args.is_deleted
    ])?;
    Ok(id)
}

// Backdates check-in state so streak rules can be exercised without waiting.
pub(crate) fn set_last_checkin_for_test(
    conn: &Connection,
    user_id: &str,
    date: NaiveDate,
    streak: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE users SET last_checkin = ?1, checkin_streak = ?2 WHERE id = ?3",
        params![date, streak, user_id],
    )?;
    Ok(())
}
