/// Database path resolution
pub mod database;

/// Reward tuning from config.toml
pub mod rewards;

/// Voucher catalogue seeding from config.toml
pub mod vouchers;

use crate::errors::{Error, Result};
use rewards::RewardsConfig;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};
use vouchers::VoucherConfig;

/// Shape of the config.toml file.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    rewards: RewardsConfig,
    #[serde(default)]
    vouchers: Vec<VoucherConfig>,
}

/// Fully resolved application configuration, constructed once at startup and
/// passed down explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub rewards: RewardsConfig,
    pub vouchers_from_toml: Vec<VoucherConfig>,
}

fn load_file_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path = path.as_ref();
    if !path.exists() {
        warn!(
            "Config file {} not found; using defaults with an empty voucher catalogue.",
            path.display()
        );
        return Ok(FileConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;
    toml::from_str(&contents).map_err(|e| Error::Config(format!("Failed to parse config.toml: {e}")))
}

/// Loads the full application configuration.
///
/// The config file location comes from `RETHRIVE_CONFIG` (default
/// `./config.toml`); the database path from `RETHRIVE_DATABASE_PATH`.
pub fn load_app_configuration() -> Result<AppConfig> {
    let config_path =
        std::env::var("RETHRIVE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let file = load_file_config(&config_path)?;
    let database_path = database::get_database_path()?;
    info!(
        "Loaded configuration: {} vouchers, database at {}",
        file.vouchers.len(),
        database_path
    );
    Ok(AppConfig {
        database_path,
        rewards: file.rewards,
        vouchers_from_toml: file.vouchers,
    })
}
