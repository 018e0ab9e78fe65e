//! `ReThrive` - campus marketplace and donation core
//!
//! This crate provides the transactional core of a campus second-hand
//! marketplace: dual-confirmation completion of orders and donation claims,
//! an EcoPoints loyalty ledger, limited-stock voucher redemption, and the
//! periodic auto-completion sweep for exchanges left unconfirmed.

// Deny the most critical lints that could lead to bugs or security issues
#![deny(
    // Security and correctness
    unsafe_code,
    unsafe_op_in_unsafe_fn,

    // Code quality - things that are almost always bugs
    unreachable_code,
    unreachable_patterns,
    unused_must_use,

    // Documentation - broken links are bugs
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
)]
// Warn on things that should be fixed but aren't necessarily bugs
#![warn(
    missing_docs,

    clippy::all,
    clippy::pedantic,

    // Correctness
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::exit,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,

    // Future compatibility
    future_incompatible,
    rust_2018_idioms,
)]
// Allow some pedantic lints that are too noisy or not applicable
#![allow(
    clippy::module_name_repetitions,  // Common pattern in Rust
    clippy::missing_errors_doc,        // Will add gradually
    clippy::missing_panics_doc,        // Will add gradually
)]

/// Configuration management for database path, rewards, and voucher seeding
pub mod config;
/// Core business logic - confirmation engine, notifications, maintenance sweep
pub mod core;
/// Data-access layer over the SQLite store
pub mod db;
/// Unified error types and result handling
pub mod errors;
/// Record types for users, listings, exchanges, and vouchers
pub mod models;
