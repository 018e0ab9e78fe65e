use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A registered marketplace user and the owner of an EcoPoints balance.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String, // opaque auth-provider id, TEXT primary key
    pub name: String,
    /// Loyalty balance. Never negative; the schema carries a CHECK constraint
    /// and the ledger only debits inside a gated transaction.
    pub eco_points: i64,
    pub last_checkin: Option<NaiveDate>,
    pub checkin_streak: i64,
}

/// Whether a listing is for sale or offered as a donation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Sale,
    Donation,
}

impl ItemKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Donation => "donation",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(Self::Sale),
            "donation" => Some(Self::Donation),
            _ => None,
        }
    }
}

/// Lifecycle of a listing: free, held by an open exchange, or handed over.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Available,
    Reserved,
    Exchanged,
}

impl ItemStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::Exchanged => "exchanged",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "reserved" => Some(Self::Reserved),
            "exchanged" => Some(Self::Exchanged),
            _ => None,
        }
    }
}

/// A second-hand listing offered for sale or donation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub owner_id: String,
    pub kind: ItemKind,
    pub price: Option<f64>, // None for donations
    pub status: ItemStatus,
    pub is_deleted: bool, // For soft deletes
}

/// Order lifecycle.
///
/// `Pending` from creation, `Confirmed` once the seller accepts,
/// `Completed` when both parties have confirmed the exchange,
/// `IssueReported` when the buyer flags a problem (blocks completion
/// until cleared).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Completed,
    IssueReported,
}

impl OrderStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::IssueReported => "issue_reported",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "completed" => Some(Self::Completed),
            "issue_reported" => Some(Self::IssueReported),
            _ => None,
        }
    }
}

/// One marketplace purchase between a buyer and a seller.
///
/// Completion requires both `seller_confirmed` (delivered) and
/// `buyer_confirmed` (received); whichever party confirms second triggers the
/// transition to `Completed` and the one-time reward disbursement.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    pub id: i64,
    pub item_id: i64,
    pub buyer_id: String,
    pub buyer_name: String,
    pub seller_id: String,
    pub seller_name: String,
    pub buyer_confirmed: bool,
    pub seller_confirmed: bool,
    pub buyer_confirmed_at: Option<DateTime<Utc>>,
    pub seller_confirmed_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Donation claim lifecycle: open until both sides confirm the handover.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Pending,
    Completed,
}

impl ClaimStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One donation handover between a donor and a receiver.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DonationClaim {
    pub id: i64,
    pub item_id: i64,
    pub donor_id: String,
    pub donor_name: String,
    pub receiver_id: String,
    pub receiver_name: String,
    pub donor_confirmed: bool,
    pub receiver_confirmed: bool,
    pub donor_confirmed_at: Option<DateTime<Utc>>,
    pub receiver_confirmed_at: Option<DateTime<Utc>>,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A limited-stock reward redeemable for EcoPoints.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Voucher {
    pub id: i64,
    pub title: String,
    pub cost_points: i64,
    pub total_quantity: i64,
    /// Only ever decremented inside the same transaction that debits points
    /// and records the claim.
    pub remaining_quantity: i64,
    pub is_deleted: bool,
}

/// Membership row of a user's claimed-voucher set; unique per (voucher, user).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VoucherClaim {
    pub voucher_id: i64,
    pub user_id: String,
    pub claimed_at: DateTime<Utc>,
}

/// What a notification row is about.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationKind {
    OrderAwaitingConfirmation,
    OrderCompleted,
    DonationAwaitingConfirmation,
    DonationCompleted,
    VoucherClaimed,
}

/// One row of the merged notification feed, derived from store queries.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Id of the order/claim/voucher the row refers to.
    pub record_id: i64,
    pub counterparty_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
