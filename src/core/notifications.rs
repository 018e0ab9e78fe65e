//! Notification feed aggregation.
//!
//! The feed is derived from several independent store queries (orders
//! awaiting confirmation, donation claims awaiting confirmation, recent
//! completions, voucher claims) whose refreshes may arrive in any order.
//! Rather than patching the feed incrementally, the merged view is always
//! recomputed from every currently-known bucket, so a refresh callback is
//! idempotent no matter how callbacks interleave.

use crate::db::vouchers::{claims_for_user, get_voucher};
use crate::db::{
    claims_awaiting_user, completed_claims_for_user, completed_orders_for_user,
    orders_awaiting_user, DbPool,
};
use crate::errors::Result;
use crate::models::{DonationClaim, Notification, NotificationKind, Order, VoucherClaim};
use tracing::{debug, instrument};

impl Notification {
    fn for_order_awaiting(order: &Order, user_id: &str) -> Self {
        let (counterparty, message) = if order.buyer_id == user_id {
            (
                order.seller_name.clone(),
                format!("{} marked order #{} as delivered", order.seller_name, order.id),
            )
        } else {
            (
                order.buyer_name.clone(),
                format!("{} marked order #{} as received", order.buyer_name, order.id),
            )
        };
        Self {
            kind: NotificationKind::OrderAwaitingConfirmation,
            record_id: order.id,
            counterparty_name: counterparty,
            message,
            timestamp: order
                .seller_confirmed_at
                .or(order.buyer_confirmed_at)
                .unwrap_or(order.created_at),
        }
    }

    fn for_claim_awaiting(claim: &DonationClaim, user_id: &str) -> Self {
        let (counterparty, message) = if claim.receiver_id == user_id {
            (
                claim.donor_name.clone(),
                format!("{} handed over donation #{}", claim.donor_name, claim.id),
            )
        } else {
            (
                claim.receiver_name.clone(),
                format!("{} confirmed receiving donation #{}", claim.receiver_name, claim.id),
            )
        };
        Self {
            kind: NotificationKind::DonationAwaitingConfirmation,
            record_id: claim.id,
            counterparty_name: counterparty,
            message,
            timestamp: claim
                .donor_confirmed_at
                .or(claim.receiver_confirmed_at)
                .unwrap_or(claim.created_at),
        }
    }

    fn for_order_completed(order: &Order, user_id: &str) -> Self {
        let counterparty = if order.buyer_id == user_id {
            order.seller_name.clone()
        } else {
            order.buyer_name.clone()
        };
        Self {
            kind: NotificationKind::OrderCompleted,
            record_id: order.id,
            message: format!("Order #{} with {} completed", order.id, counterparty),
            counterparty_name: counterparty,
            timestamp: order.completed_at.unwrap_or(order.created_at),
        }
    }

    fn for_claim_completed(claim: &DonationClaim, user_id: &str) -> Self {
        let counterparty = if claim.receiver_id == user_id {
            claim.donor_name.clone()
        } else {
            claim.receiver_name.clone()
        };
        Self {
            kind: NotificationKind::DonationCompleted,
            record_id: claim.id,
            message: format!("Donation #{} with {} completed", claim.id, counterparty),
            counterparty_name: counterparty,
            timestamp: claim.completed_at.unwrap_or(claim.created_at),
        }
    }

    fn for_voucher_claim(claim: &VoucherClaim, title: &str) -> Self {
        Self {
            kind: NotificationKind::VoucherClaimed,
            record_id: claim.voucher_id,
            counterparty_name: title.to_string(),
            message: format!("Voucher '{title}' claimed"),
            timestamp: claim.claimed_at,
        }
    }
}

/// Recomputes the merged feed from all currently-known buckets.
///
/// Newest first; when the same record shows up in more than one bucket
/// (stale refresh overlapping a fresh one) only the newest row per
/// (kind, record id) survives.
#[must_use]
pub fn merge_notifications(buckets: Vec<Vec<Notification>>) -> Vec<Notification> {
    let mut merged: Vec<Notification> = buckets.into_iter().flatten().collect();
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let mut seen = std::collections::HashSet::new();
    merged.retain(|n| seen.insert((n.kind, n.record_id)));
    merged
}

/// Builds the full notification feed for a user from fresh store queries.
#[instrument(skip(pool))]
pub async fn notification_feed(pool: &DbPool, user_id: &str) -> Result<Vec<Notification>> {
    let order_bucket: Vec<Notification> = orders_awaiting_user(pool, user_id)
        .await?
        .iter()
        .map(|o| Notification::for_order_awaiting(o, user_id))
        .collect();
    let claim_bucket: Vec<Notification> = claims_awaiting_user(pool, user_id)
        .await?
        .iter()
        .map(|c| Notification::for_claim_awaiting(c, user_id))
        .collect();
    let completed_orders: Vec<Notification> = completed_orders_for_user(pool, user_id)
        .await?
        .iter()
        .map(|o| Notification::for_order_completed(o, user_id))
        .collect();
    let completed_claims: Vec<Notification> = completed_claims_for_user(pool, user_id)
        .await?
        .iter()
        .map(|c| Notification::for_claim_completed(c, user_id))
        .collect();

    let mut voucher_bucket = Vec::new();
    for claim in claims_for_user(pool, user_id).await? {
        // Soft-deleted vouchers drop out of the feed with their catalogue entry
        if let Some(voucher) = get_voucher(pool, claim.voucher_id).await? {
            voucher_bucket.push(Notification::for_voucher_claim(&claim, &voucher.title));
        }
    }

    let feed = merge_notifications(vec![
        order_bucket,
        claim_bucket,
        completed_orders,
        completed_claims,
        voucher_bucket,
    ]);
    debug!("Built notification feed of {} rows for {}", feed.len(), user_id);
    Ok(feed)
}
