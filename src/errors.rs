use thiserror::Error;

/// Crate-wide error type.
///
/// Infrastructure failures (`Config`, `Database`, `Io`, `EnvVar`) carry a
/// message; ledger and claim failures are structured so callers can show each
/// one distinctly at the UI boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("User {user_id} may not perform this action on this exchange")]
    Unauthorized { user_id: String },

    #[error("Voucher already claimed by this user")]
    AlreadyClaimed,

    #[error("Insufficient EcoPoints: have {have}, need {need}")]
    InsufficientPoints { have: i64, need: i64 },

    #[error("Voucher is out of stock")]
    OutOfStock,

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: i64 },

    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
