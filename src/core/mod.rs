/// Dual-confirmation completion engine for orders and donation claims
pub mod confirm;
/// Auto-completion sweep for exchanges left unconfirmed past the grace period
pub mod maintenance;
/// Notification feed aggregation across independent store queries
pub mod notifications;

pub use confirm::{
    apply_confirmation, confirm_donation_handover, confirm_donation_received,
    confirm_order_delivery, ConfirmDecision, ConfirmOutcome, RewardCredit, RewardRule,
};
pub use maintenance::{run_sweep, SweepResult};
pub use notifications::{merge_notifications, notification_feed};
