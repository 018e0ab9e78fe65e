pub mod connection;
pub mod donations;
pub mod items;
pub mod orders;
pub(crate) mod schema;
pub mod system_state;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod users;
pub mod vouchers;

pub use connection::{init_db, DbPool};
pub use donations::{
    claims_awaiting_user, completed_claims_for_user, create_claim, get_claim,
    stale_handover_claims,
};
pub use items::{create_item, get_item, soft_delete_item};
pub use orders::{
    accept_order, clear_issue, completed_orders_for_user, create_order, get_order,
    orders_awaiting_user, report_issue, stale_delivered_orders,
};
pub use system_state::{get_system_state_value, set_system_state_value};
pub use users::{create_user, credit_points, daily_checkin, get_user, CheckinOutcome};
pub use vouchers::{
    claim_voucher, claims_for_user, get_voucher, list_active_vouchers, seed_initial_vouchers,
};
