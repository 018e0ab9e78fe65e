//! Auto-completion sweep.
//!
//! An exchange where one party confirmed fulfillment and the counterparty
//! went silent is completed on the silent party's behalf after a grace
//! period, with the same reward disbursement a manual confirmation would
//! have produced. The daemon runs this periodically; each record is
//! completed in its own transaction and re-validated inside it.

use crate::core::confirm::{claim_completion_rewards, order_completion_rewards, RewardRule};
use crate::db::donations::{map_claim_row, CLAIM_COLUMNS};
use crate::db::items::mark_item_exchanged_in_tx;
use crate::db::orders::{map_order_row, ORDER_COLUMNS};
use crate::db::users::credit_points_in_tx;
use crate::db::{
    set_system_state_value, stale_delivered_orders, stale_handover_claims, DbPool,
};
use crate::errors::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, instrument};

pub(crate) const LAST_SWEEP_KEY: &str = "last_sweep";

/// Summary of one sweep run.
#[derive(Debug, Clone)]
pub struct SweepResult {
    /// Ids of orders auto-completed on the buyer's behalf.
    pub completed_orders: Vec<i64>,
    /// Ids of donation claims auto-completed on the receiver's behalf.
    pub completed_claims: Vec<i64>,
    pub swept_at: DateTime<Utc>,
}

impl SweepResult {
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed_orders.len() + self.completed_claims.len()
    }
}

fn auto_complete_order(pool: &DbPool, order_id: i64, points: i64) -> Result<bool> {
    let mut conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock for sweep".to_string()))?;
    let tx = conn
        .transaction()
        .map_err(|e| Error::Database(format!("Failed to start sweep transaction: {}", e)))?;

    // Re-validate inside the transaction; the buyer may have confirmed or
    // reported an issue since the stale listing was read.
    let order = tx
        .prepare_cached(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE id = ?1 AND seller_confirmed = TRUE AND buyer_confirmed = FALSE
               AND status IN ('pending', 'confirmed')"
        ))?
        .query_row(params![order_id], map_order_row)
        .optional()?;
    let Some(order) = order else {
        debug!("Order {} no longer eligible for auto-completion", order_id);
        return Ok(false);
    };

    let now = Utc::now();
    tx.execute(
        "UPDATE orders SET buyer_confirmed = TRUE, buyer_confirmed_at = ?1,
                status = 'completed', completed_at = ?1 WHERE id = ?2",
        params![now, order_id],
    )?;
    mark_item_exchanged_in_tx(&tx, order.item_id)?;
    for credit in order_completion_rewards(&order, points) {
        credit_points_in_tx(&tx, &credit.user_id, &credit.user_name, credit.amount)?;
    }
    tx.commit()
        .map_err(|e| Error::Database(format!("Failed to commit auto-completion: {}", e)))?;
    info!("Auto-completed order {} on the buyer's behalf", order_id);
    Ok(true)
}

fn auto_complete_claim(pool: &DbPool, claim_id: i64, points: i64) -> Result<bool> {
    let mut conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock for sweep".to_string()))?;
    let tx = conn
        .transaction()
        .map_err(|e| Error::Database(format!("Failed to start sweep transaction: {}", e)))?;

    let claim = tx
        .prepare_cached(&format!(
            "SELECT {CLAIM_COLUMNS} FROM donation_claims
             WHERE id = ?1 AND donor_confirmed = TRUE AND receiver_confirmed = FALSE
               AND status = 'pending'"
        ))?
        .query_row(params![claim_id], map_claim_row)
        .optional()?;
    let Some(claim) = claim else {
        debug!("Claim {} no longer eligible for auto-completion", claim_id);
        return Ok(false);
    };

    let now = Utc::now();
    tx.execute(
        "UPDATE donation_claims SET receiver_confirmed = TRUE, receiver_confirmed_at = ?1,
                status = 'completed', completed_at = ?1 WHERE id = ?2",
        params![now, claim_id],
    )?;
    mark_item_exchanged_in_tx(&tx, claim.item_id)?;
    // Completion happens through the receiver-side path, so that flow's
    // reward rule applies.
    for credit in claim_completion_rewards(&claim, RewardRule::ReceiverOnly, points) {
        credit_points_in_tx(&tx, &credit.user_id, &credit.user_name, credit.amount)?;
    }
    tx.commit()
        .map_err(|e| Error::Database(format!("Failed to commit auto-completion: {}", e)))?;
    info!("Auto-completed donation claim {} on the receiver's behalf", claim_id);
    Ok(true)
}

/// Completes every exchange whose counterparty has been silent for at least
/// `auto_complete_days` since the other party confirmed, and records the
/// sweep time in `system_state`.
#[instrument(skip(pool))]
pub async fn run_sweep(pool: &DbPool, auto_complete_days: i64, points: i64) -> Result<SweepResult> {
    let swept_at = Utc::now();
    let cutoff = swept_at - Duration::days(auto_complete_days);
    debug!("Sweeping exchanges unconfirmed since {}", cutoff);

    let mut completed_orders = Vec::new();
    for order in stale_delivered_orders(pool, cutoff).await? {
        if auto_complete_order(pool, order.id, points)? {
            completed_orders.push(order.id);
        }
    }

    let mut completed_claims = Vec::new();
    for claim in stale_handover_claims(pool, cutoff).await? {
        if auto_complete_claim(pool, claim.id, points)? {
            completed_claims.push(claim.id);
        }
    }

    set_system_state_value(pool, LAST_SWEEP_KEY, &swept_at.to_rfc3339()).await?;

    let result = SweepResult {
        completed_orders,
        completed_claims,
        swept_at,
    };
    info!(
        "Sweep finished: {} orders and {} claims auto-completed",
        result.completed_orders.len(),
        result.completed_claims.len()
    );
    Ok(result)
}
