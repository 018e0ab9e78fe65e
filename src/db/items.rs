use crate::db::DbPool;
use crate::errors::{Error, Result};
use crate::models::{Item, ItemKind, ItemStatus};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{info, instrument, warn};

pub(crate) fn map_item_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let kind: String = row.get(3)?;
    let status: String = row.get(5)?;
    Ok(Item {
        id: row.get(0)?,
        title: row.get(1)?,
        owner_id: row.get(2)?,
        kind: ItemKind::parse(&kind).unwrap_or(ItemKind::Sale),
        price: row.get(4)?,
        status: ItemStatus::parse(&status).unwrap_or(ItemStatus::Available),
        is_deleted: row.get(6)?,
    })
}

const ITEM_COLUMNS: &str = "id, title, owner_id, kind, price, status, is_deleted";

/// Creates a new listing in `Available` state and returns its id.
#[instrument(skip(pool))]
pub async fn create_item(
    pool: &DbPool,
    title: &str,
    owner_id: &str,
    kind: ItemKind,
    price: Option<f64>,
) -> Result<i64> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO items (title, owner_id, kind, price, status, is_deleted)
         VALUES (?1, ?2, ?3, ?4, 'available', FALSE)",
    )?;
    let item_id = stmt.insert(params![title, owner_id, kind.as_str(), price])?;
    info!(
        "Created {} listing '{}' (id {}) for owner {}",
        kind.as_str(),
        title,
        item_id,
        owner_id
    );
    Ok(item_id)
}

#[instrument(skip(pool))]
pub async fn get_item(pool: &DbPool, item_id: i64) -> Result<Option<Item>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1 AND is_deleted = FALSE"
    ))?;
    let item = stmt.query_row(params![item_id], map_item_row).optional()?;
    Ok(item)
}

/// Soft-deletes a listing. Only the owner may delete, and a reserved listing
/// (held by an open exchange) cannot be withdrawn.
#[instrument(skip(pool))]
pub async fn soft_delete_item(pool: &DbPool, item_id: i64, user_id: &str) -> Result<bool> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock for delete".to_string()))?;

    let mut stmt_find = conn.prepare_cached(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1 AND is_deleted = FALSE"
    ))?;
    let item = stmt_find
        .query_row(params![item_id], map_item_row)
        .optional()?;

    let Some(item) = item else {
        info!("No active listing {} to delete.", item_id);
        return Ok(false);
    };

    if item.owner_id != user_id {
        warn!(
            "User {} attempted to delete listing {} owned by {}. Denied.",
            user_id, item_id, item.owner_id
        );
        return Err(Error::Unauthorized {
            user_id: user_id.to_string(),
        });
    }
    if item.status == ItemStatus::Reserved {
        warn!(
            "Listing {} is reserved by an open exchange and cannot be deleted.",
            item_id
        );
        return Ok(false);
    }

    let rows = conn.execute(
        "UPDATE items SET is_deleted = TRUE WHERE id = ?1 AND is_deleted = FALSE",
        params![item_id],
    )?;
    if rows > 0 {
        info!("Soft-deleted listing {} by owner {}", item_id, user_id);
    }
    Ok(rows > 0)
}

/// Moves a listing to `Reserved` inside an open transaction.
///
/// Fails with `NotFound` when the listing is missing or deleted, and returns
/// `false` when it was not available (already reserved or exchanged).
pub(crate) fn reserve_item_in_tx(tx: &rusqlite::Transaction<'_>, item_id: i64) -> Result<bool> {
    let exists: Option<i64> = tx
        .prepare_cached("SELECT id FROM items WHERE id = ?1 AND is_deleted = FALSE")?
        .query_row(params![item_id], |row| row.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(Error::NotFound {
            entity: "item",
            id: item_id.to_string(),
        });
    }
    let rows = tx.execute(
        "UPDATE items SET status = 'reserved' WHERE id = ?1 AND status = 'available'",
        params![item_id],
    )?;
    Ok(rows > 0)
}

/// Marks a listing as handed over inside an open transaction.
pub(crate) fn mark_item_exchanged_in_tx(tx: &rusqlite::Transaction<'_>, item_id: i64) -> Result<()> {
    tx.execute(
        "UPDATE items SET status = 'exchanged' WHERE id = ?1",
        params![item_id],
    )?;
    Ok(())
}
