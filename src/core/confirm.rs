//! Dual-confirmation completion engine.
//!
//! Orders and donation claims close the same way: each party independently
//! confirms fulfillment, and whichever party confirms second triggers the
//! transition to completed plus the one-time reward disbursement. The flag
//! update, the status transition, the listing handover, and the ledger
//! credits are applied inside a single SQL transaction so the ledger can
//! never be credited without the record being marked completed, or vice
//! versa.

use crate::db::donations::{map_claim_row, CLAIM_COLUMNS};
use crate::db::items::mark_item_exchanged_in_tx;
use crate::db::orders::{map_order_row, ORDER_COLUMNS};
use crate::db::users::credit_points_in_tx;
use crate::db::DbPool;
use crate::errors::{Error, Result};
use crate::models::{ClaimStatus, DonationClaim, Order, OrderStatus};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Transaction};
use tracing::{debug, info, instrument, warn};

/// What a single confirmation does to a record, given the two flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    /// The caller had already confirmed; nothing changes.
    AlreadyConfirmed,
    /// First of the two confirmations; the record stays pending.
    AwaitingOther,
    /// Second confirmation; the record completes and rewards disburse.
    Completes,
}

/// Pure completion rule: no I/O, exhaustively unit-tested.
#[must_use]
pub const fn apply_confirmation(mine: bool, theirs: bool) -> ConfirmDecision {
    match (mine, theirs) {
        (true, _) => ConfirmDecision::AlreadyConfirmed,
        (false, true) => ConfirmDecision::Completes,
        (false, false) => ConfirmDecision::AwaitingOther,
    }
}

/// Which side earns points when a record completes.
///
/// The three call sites historically award differently and are deliberately
/// not unified: order completion pays both parties, the receiver-facing
/// donation flow pays the receiver, the donor-facing donation flow pays the
/// donor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardRule {
    BothParties,
    ReceiverOnly,
    DonorOnly,
}

/// One ledger credit produced by a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardCredit {
    pub user_id: String,
    pub user_name: String,
    pub amount: i64,
}

/// Result of a confirmation call, for the caller's UI state.
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub completed: bool,
    /// True when the caller had already confirmed before this call.
    pub already_confirmed: bool,
    /// The party that still has to confirm, when the record stays pending.
    /// Lets the caller surface a pending-confirmation banner.
    pub awaiting_user_id: Option<String>,
    pub rewards: Vec<RewardCredit>,
}

fn disburse(tx: &Transaction<'_>, rewards: &[RewardCredit]) -> Result<()> {
    for credit in rewards {
        credit_points_in_tx(tx, &credit.user_id, &credit.user_name, credit.amount)?;
    }
    Ok(())
}

/// Records a party's delivery/receipt confirmation on an order.
///
/// The caller must be the buyer or the seller of the order; anyone else is
/// rejected with `Unauthorized`. Confirming twice is idempotent and never
/// pays a second reward. When both flags are set the order completes and
/// both parties are credited `points` each.
#[instrument(skip(pool))]
pub async fn confirm_order_delivery(
    pool: &DbPool,
    order_id: i64,
    user_id: &str,
    points: i64,
) -> Result<ConfirmOutcome> {
    let mut conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock for confirmation".to_string()))?;
    let tx = conn.transaction().map_err(|e| {
        Error::Database(format!("Failed to start confirmation transaction: {}", e))
    })?;

    let order = tx
        .prepare_cached(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"))?
        .query_row(params![order_id], map_order_row)
        .optional()?
        .ok_or_else(|| Error::NotFound {
            entity: "order",
            id: order_id.to_string(),
        })?;

    let is_buyer = order.buyer_id == user_id;
    let is_seller = order.seller_id == user_id;
    if !is_buyer && !is_seller {
        warn!(
            "User {} attempted to confirm order {} they are not part of. Denied.",
            user_id, order_id
        );
        return Err(Error::Unauthorized {
            user_id: user_id.to_string(),
        });
    }

    if order.status == OrderStatus::Completed {
        debug!("Order {} already completed; confirmation is a no-op", order_id);
        return Ok(ConfirmOutcome {
            completed: true,
            already_confirmed: true,
            awaiting_user_id: None,
            rewards: Vec::new(),
        });
    }
    if order.status == OrderStatus::IssueReported {
        return Err(Error::Database(format!(
            "Order {} has an open issue report; resolve it before confirming",
            order_id
        )));
    }

    let (mine, theirs) = if is_buyer {
        (order.buyer_confirmed, order.seller_confirmed)
    } else {
        (order.seller_confirmed, order.buyer_confirmed)
    };

    match apply_confirmation(mine, theirs) {
        ConfirmDecision::AlreadyConfirmed => {
            let awaiting = if is_buyer { &order.seller_id } else { &order.buyer_id };
            debug!(
                "User {} re-confirmed order {}; still awaiting {}",
                user_id, order_id, awaiting
            );
            Ok(ConfirmOutcome {
                completed: false,
                already_confirmed: true,
                awaiting_user_id: Some(awaiting.clone()),
                rewards: Vec::new(),
            })
        }
        ConfirmDecision::AwaitingOther => {
            let now = Utc::now();
            let flag_sql = if is_buyer {
                "UPDATE orders SET buyer_confirmed = TRUE, buyer_confirmed_at = ?1 WHERE id = ?2"
            } else {
                "UPDATE orders SET seller_confirmed = TRUE, seller_confirmed_at = ?1 WHERE id = ?2"
            };
            tx.execute(flag_sql, params![now, order_id])?;
            tx.commit().map_err(|e| {
                Error::Database(format!("Failed to commit confirmation: {}", e))
            })?;
            let awaiting = if is_buyer { order.seller_id } else { order.buyer_id };
            info!(
                "Order {} confirmed by {}; awaiting {}",
                order_id, user_id, awaiting
            );
            Ok(ConfirmOutcome {
                completed: false,
                already_confirmed: false,
                awaiting_user_id: Some(awaiting),
                rewards: Vec::new(),
            })
        }
        ConfirmDecision::Completes => {
            let now = Utc::now();
            let flag_sql = if is_buyer {
                "UPDATE orders SET buyer_confirmed = TRUE, buyer_confirmed_at = ?1,
                        status = 'completed', completed_at = ?1 WHERE id = ?2"
            } else {
                "UPDATE orders SET seller_confirmed = TRUE, seller_confirmed_at = ?1,
                        status = 'completed', completed_at = ?1 WHERE id = ?2"
            };
            tx.execute(flag_sql, params![now, order_id])?;
            mark_item_exchanged_in_tx(&tx, order.item_id)?;

            let rewards = order_completion_rewards(&order, points);
            disburse(&tx, &rewards)?;
            tx.commit().map_err(|e| {
                Error::Database(format!("Failed to commit order completion: {}", e))
            })?;
            info!(
                "Order {} completed by {}'s confirmation; credited {} parties",
                order_id,
                user_id,
                rewards.len()
            );
            Ok(ConfirmOutcome {
                completed: true,
                already_confirmed: false,
                awaiting_user_id: None,
                rewards,
            })
        }
    }
}

/// Order completion pays both parties (`RewardRule::BothParties`).
pub(crate) fn order_completion_rewards(order: &Order, points: i64) -> Vec<RewardCredit> {
    vec![
        RewardCredit {
            user_id: order.buyer_id.clone(),
            user_name: order.buyer_name.clone(),
            amount: points,
        },
        RewardCredit {
            user_id: order.seller_id.clone(),
            user_name: order.seller_name.clone(),
            amount: points,
        },
    ]
}

pub(crate) fn claim_completion_rewards(
    claim: &DonationClaim,
    rule: RewardRule,
    points: i64,
) -> Vec<RewardCredit> {
    match rule {
        RewardRule::BothParties => vec![
            RewardCredit {
                user_id: claim.donor_id.clone(),
                user_name: claim.donor_name.clone(),
                amount: points,
            },
            RewardCredit {
                user_id: claim.receiver_id.clone(),
                user_name: claim.receiver_name.clone(),
                amount: points,
            },
        ],
        RewardRule::ReceiverOnly => vec![RewardCredit {
            user_id: claim.receiver_id.clone(),
            user_name: claim.receiver_name.clone(),
            amount: points,
        }],
        RewardRule::DonorOnly => vec![RewardCredit {
            user_id: claim.donor_id.clone(),
            user_name: claim.donor_name.clone(),
            amount: points,
        }],
    }
}

/// Shared transactional body for the two donation confirmation flows.
///
/// `as_receiver` selects which party the caller must be and which flag is
/// set; `rule` is the call site's historical reward rule, applied only when
/// this confirmation completes the claim.
async fn confirm_claim(
    pool: &DbPool,
    claim_id: i64,
    user_id: &str,
    as_receiver: bool,
    rule: RewardRule,
    points: i64,
) -> Result<ConfirmOutcome> {
    let mut conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock for confirmation".to_string()))?;
    let tx = conn.transaction().map_err(|e| {
        Error::Database(format!("Failed to start confirmation transaction: {}", e))
    })?;

    let claim = tx
        .prepare_cached(&format!(
            "SELECT {CLAIM_COLUMNS} FROM donation_claims WHERE id = ?1"
        ))?
        .query_row(params![claim_id], map_claim_row)
        .optional()?
        .ok_or_else(|| Error::NotFound {
            entity: "donation claim",
            id: claim_id.to_string(),
        })?;

    let expected = if as_receiver {
        &claim.receiver_id
    } else {
        &claim.donor_id
    };
    if expected != user_id {
        warn!(
            "User {} attempted the wrong confirmation flow on claim {}. Denied.",
            user_id, claim_id
        );
        return Err(Error::Unauthorized {
            user_id: user_id.to_string(),
        });
    }

    if claim.status == ClaimStatus::Completed {
        debug!("Claim {} already completed; confirmation is a no-op", claim_id);
        return Ok(ConfirmOutcome {
            completed: true,
            already_confirmed: true,
            awaiting_user_id: None,
            rewards: Vec::new(),
        });
    }

    let (mine, theirs) = if as_receiver {
        (claim.receiver_confirmed, claim.donor_confirmed)
    } else {
        (claim.donor_confirmed, claim.receiver_confirmed)
    };

    match apply_confirmation(mine, theirs) {
        ConfirmDecision::AlreadyConfirmed => {
            let awaiting = if as_receiver { &claim.donor_id } else { &claim.receiver_id };
            Ok(ConfirmOutcome {
                completed: false,
                already_confirmed: true,
                awaiting_user_id: Some(awaiting.clone()),
                rewards: Vec::new(),
            })
        }
        ConfirmDecision::AwaitingOther => {
            let now = Utc::now();
            let flag_sql = if as_receiver {
                "UPDATE donation_claims SET receiver_confirmed = TRUE, receiver_confirmed_at = ?1 WHERE id = ?2"
            } else {
                "UPDATE donation_claims SET donor_confirmed = TRUE, donor_confirmed_at = ?1 WHERE id = ?2"
            };
            tx.execute(flag_sql, params![now, claim_id])?;
            tx.commit().map_err(|e| {
                Error::Database(format!("Failed to commit confirmation: {}", e))
            })?;
            let awaiting = if as_receiver { claim.donor_id } else { claim.receiver_id };
            info!(
                "Donation claim {} confirmed by {}; awaiting {}",
                claim_id, user_id, awaiting
            );
            Ok(ConfirmOutcome {
                completed: false,
                already_confirmed: false,
                awaiting_user_id: Some(awaiting),
                rewards: Vec::new(),
            })
        }
        ConfirmDecision::Completes => {
            let now = Utc::now();
            let flag_sql = if as_receiver {
                "UPDATE donation_claims SET receiver_confirmed = TRUE, receiver_confirmed_at = ?1,
                        status = 'completed', completed_at = ?1 WHERE id = ?2"
            } else {
                "UPDATE donation_claims SET donor_confirmed = TRUE, donor_confirmed_at = ?1,
                        status = 'completed', completed_at = ?1 WHERE id = ?2"
            };
            tx.execute(flag_sql, params![now, claim_id])?;
            mark_item_exchanged_in_tx(&tx, claim.item_id)?;

            let rewards = claim_completion_rewards(&claim, rule, points);
            disburse(&tx, &rewards)?;
            tx.commit().map_err(|e| {
                Error::Database(format!("Failed to commit claim completion: {}", e))
            })?;
            info!(
                "Donation claim {} completed by {}'s confirmation ({:?})",
                claim_id, user_id, rule
            );
            Ok(ConfirmOutcome {
                completed: true,
                already_confirmed: false,
                awaiting_user_id: None,
                rewards,
            })
        }
    }
}

/// Receiver confirms the donation was received. If this completes the claim,
/// the receiver earns the points (this flow's historical rule).
#[instrument(skip(pool))]
pub async fn confirm_donation_received(
    pool: &DbPool,
    claim_id: i64,
    user_id: &str,
    points: i64,
) -> Result<ConfirmOutcome> {
    confirm_claim(pool, claim_id, user_id, true, RewardRule::ReceiverOnly, points).await
}

/// Donor confirms the donation was handed over. If this completes the claim,
/// the donor earns the points (this flow's historical rule).
#[instrument(skip(pool))]
pub async fn confirm_donation_handover(
    pool: &DbPool,
    claim_id: i64,
    user_id: &str,
    points: i64,
) -> Result<ConfirmOutcome> {
    confirm_claim(pool, claim_id, user_id, false, RewardRule::DonorOnly, points).await
}
