use crate::db::items::reserve_item_in_tx;
use crate::db::DbPool;
use crate::errors::{Error, Result};
use crate::models::{Order, OrderStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{info, instrument, warn};

pub(crate) const ORDER_COLUMNS: &str = "id, item_id, buyer_id, buyer_name, seller_id, seller_name, \
     buyer_confirmed, seller_confirmed, buyer_confirmed_at, seller_confirmed_at, \
     status, created_at, completed_at";

pub(crate) fn map_order_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let status: String = row.get(10)?;
    Ok(Order {
        id: row.get(0)?,
        item_id: row.get(1)?,
        buyer_id: row.get(2)?,
        buyer_name: row.get(3)?,
        seller_id: row.get(4)?,
        seller_name: row.get(5)?,
        buyer_confirmed: row.get(6)?,
        seller_confirmed: row.get(7)?,
        buyer_confirmed_at: row.get(8)?,
        seller_confirmed_at: row.get(9)?,
        status: OrderStatus::parse(&status).unwrap_or(OrderStatus::Pending),
        created_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

/// Opens an order for a sale listing, reserving the listing in the same
/// transaction so no second buyer can order it.
#[instrument(skip(pool))]
pub async fn create_order(
    pool: &DbPool,
    item_id: i64,
    buyer_id: &str,
    buyer_name: &str,
) -> Result<i64> {
    let mut conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let tx = conn
        .transaction()
        .map_err(|e| Error::Database(format!("Failed to start transaction for order: {}", e)))?;

    let owner: Option<(String, String)> = tx
        .prepare_cached(
            "SELECT i.owner_id, u.name FROM items i JOIN users u ON u.id = i.owner_id
             WHERE i.id = ?1 AND i.is_deleted = FALSE",
        )?
        .query_row(params![item_id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;
    let (seller_id, seller_name) = owner.ok_or_else(|| Error::NotFound {
        entity: "item",
        id: item_id.to_string(),
    })?;

    if seller_id == buyer_id {
        warn!(
            "User {} attempted to order their own listing {}. Denied.",
            buyer_id, item_id
        );
        return Err(Error::Unauthorized {
            user_id: buyer_id.to_string(),
        });
    }

    if !reserve_item_in_tx(&tx, item_id)? {
        return Err(Error::Database(format!(
            "Listing {} is no longer available",
            item_id
        )));
    }

    let created_at = Utc::now();
    let order_id = tx
        .prepare_cached(
            "INSERT INTO orders (item_id, buyer_id, buyer_name, seller_id, seller_name, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
        )?
        .insert(params![
            item_id,
            buyer_id,
            buyer_name,
            seller_id,
            seller_name,
            created_at
        ])?;

    tx.commit()
        .map_err(|e| Error::Database(format!("Failed to commit order creation: {}", e)))?;
    info!(
        "Created order {} for listing {}: buyer={}, seller={}",
        order_id, item_id, buyer_id, seller_id
    );
    Ok(order_id)
}

#[instrument(skip(pool))]
pub async fn get_order(pool: &DbPool, order_id: i64) -> Result<Option<Order>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"))?;
    let order = stmt.query_row(params![order_id], map_order_row).optional()?;
    Ok(order)
}

/// Seller accepts a pending order (`Pending` -> `Confirmed`).
///
/// Returns `false` when the order was not in `Pending` (already accepted,
/// completed, or under an issue report).
#[instrument(skip(pool))]
pub async fn accept_order(pool: &DbPool, order_id: i64, user_id: &str) -> Result<bool> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let order = conn
        .prepare_cached(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"))?
        .query_row(params![order_id], map_order_row)
        .optional()?
        .ok_or_else(|| Error::NotFound {
            entity: "order",
            id: order_id.to_string(),
        })?;

    if order.seller_id != user_id {
        return Err(Error::Unauthorized {
            user_id: user_id.to_string(),
        });
    }

    let rows = conn.execute(
        "UPDATE orders SET status = 'confirmed' WHERE id = ?1 AND status = 'pending'",
        params![order_id],
    )?;
    if rows > 0 {
        info!("Order {} accepted by seller {}", order_id, user_id);
    }
    Ok(rows > 0)
}

/// Buyer flags a problem with the exchange; blocks completion and the
/// auto-completion sweep until cleared.
#[instrument(skip(pool))]
pub async fn report_issue(pool: &DbPool, order_id: i64, user_id: &str) -> Result<()> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let order = conn
        .prepare_cached(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"))?
        .query_row(params![order_id], map_order_row)
        .optional()?
        .ok_or_else(|| Error::NotFound {
            entity: "order",
            id: order_id.to_string(),
        })?;

    if order.buyer_id != user_id {
        return Err(Error::Unauthorized {
            user_id: user_id.to_string(),
        });
    }
    if order.status == OrderStatus::Completed {
        return Err(Error::Database(format!(
            "Order {} is already completed; issues must go through support",
            order_id
        )));
    }

    conn.execute(
        "UPDATE orders SET status = 'issue_reported' WHERE id = ?1",
        params![order_id],
    )?;
    warn!("Issue reported on order {} by buyer {}", order_id, user_id);
    Ok(())
}

/// Clears an issue report, returning the order to `Confirmed` so the
/// confirmation flow can proceed.
#[instrument(skip(pool))]
pub async fn clear_issue(pool: &DbPool, order_id: i64) -> Result<bool> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let rows = conn.execute(
        "UPDATE orders SET status = 'confirmed' WHERE id = ?1 AND status = 'issue_reported'",
        params![order_id],
    )?;
    if rows > 0 {
        info!("Issue cleared on order {}", order_id);
    }
    Ok(rows > 0)
}

/// Orders where the counterparty has confirmed and this user has not yet.
/// Feeds the pending-confirmation notification bucket.
#[instrument(skip(pool))]
pub async fn orders_awaiting_user(pool: &DbPool, user_id: &str) -> Result<Vec<Order>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE status != 'completed'
           AND ((buyer_id = ?1 AND seller_confirmed = TRUE AND buyer_confirmed = FALSE)
             OR (seller_id = ?1 AND buyer_confirmed = TRUE AND seller_confirmed = FALSE))
         ORDER BY created_at DESC"
    ))?;
    let orders = stmt
        .query_map(params![user_id], map_order_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(orders)
}

/// Completed orders this user took part in, newest completion first.
/// Feeds the completion notification bucket.
#[instrument(skip(pool))]
pub async fn completed_orders_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<Order>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE status = 'completed' AND (buyer_id = ?1 OR seller_id = ?1)
         ORDER BY completed_at DESC"
    ))?;
    let orders = stmt
        .query_map(params![user_id], map_order_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(orders)
}

/// Orders the seller marked delivered before `cutoff` that the buyer never
/// confirmed. Issue-reported orders are excluded.
#[instrument(skip(pool))]
pub async fn stale_delivered_orders(pool: &DbPool, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE seller_confirmed = TRUE AND buyer_confirmed = FALSE
           AND status IN ('pending', 'confirmed')
           AND seller_confirmed_at < ?1
         ORDER BY seller_confirmed_at ASC"
    ))?;
    let orders = stmt
        .query_map(params![cutoff], map_order_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(orders)
}
