use crate::errors::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info, instrument};

#[instrument(skip(conn))]
pub(crate) fn create_tables(conn: &Connection) -> Result<()> {
    debug!("Executing CREATE TABLE statements if tables do not exist.");
    conn.execute_batch(
        "BEGIN;

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            eco_points INTEGER NOT NULL DEFAULT 0 CHECK (eco_points >= 0),
            last_checkin DATE,
            checkin_streak INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            price REAL,
            status TEXT NOT NULL DEFAULT 'available',
            is_deleted BOOLEAN NOT NULL DEFAULT FALSE, -- For soft deletes
            FOREIGN KEY (owner_id) REFERENCES users (id)
        );

        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id INTEGER NOT NULL,
            buyer_id TEXT NOT NULL,
            buyer_name TEXT NOT NULL,
            seller_id TEXT NOT NULL,
            seller_name TEXT NOT NULL,
            buyer_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
            seller_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
            buyer_confirmed_at DATETIME,
            seller_confirmed_at DATETIME,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            completed_at DATETIME,
            FOREIGN KEY (item_id) REFERENCES items (id)
        );

        CREATE TABLE IF NOT EXISTS donation_claims (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id INTEGER NOT NULL,
            donor_id TEXT NOT NULL,
            donor_name TEXT NOT NULL,
            receiver_id TEXT NOT NULL,
            receiver_name TEXT NOT NULL,
            donor_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
            receiver_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
            donor_confirmed_at DATETIME,
            receiver_confirmed_at DATETIME,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            completed_at DATETIME,
            FOREIGN KEY (item_id) REFERENCES items (id)
        );

        CREATE TABLE IF NOT EXISTS vouchers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            cost_points INTEGER NOT NULL,
            total_quantity INTEGER NOT NULL,
            remaining_quantity INTEGER NOT NULL CHECK (remaining_quantity >= 0),
            is_deleted BOOLEAN NOT NULL DEFAULT FALSE -- For soft deletes
        );

        -- Voucher titles are unique across active and soft-deleted rows so
        -- catalogue seeding can re-enable a soft-deleted entry by title.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_unique_voucher_title
            ON vouchers(title);

        -- One claim per user per voucher; the claimed-voucher set.
        CREATE TABLE IF NOT EXISTS voucher_claims (
            voucher_id INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            claimed_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (voucher_id, user_id),
            FOREIGN KEY (voucher_id) REFERENCES vouchers (id),
            FOREIGN KEY (user_id) REFERENCES users (id)
        );

        CREATE TABLE IF NOT EXISTS system_state ( key TEXT PRIMARY KEY, value TEXT );
        COMMIT;",
    )
    .map_err(|e| Error::Database(format!("Failed to create marketplace tables: {}", e)))?;
    info!("Database tables ensured (points CHECK and per-user voucher claim uniqueness enforced).");
    Ok(())
}
