//! Voucher catalogue configuration loading from config.toml.
//!
//! Vouchers defined under `[[vouchers]]` seed the database on startup;
//! seeding skips titles that already exist and re-enables soft-deleted
//! entries.

use serde::Deserialize;

/// Configuration for a single voucher.
#[derive(Debug, Deserialize, Clone)]
pub struct VoucherConfig {
    /// Display title; unique across the catalogue.
    pub title: String,
    /// EcoPoints cost per claim.
    pub cost_points: i64,
    /// Stock to make available.
    pub quantity: i64,
}
