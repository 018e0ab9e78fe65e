mod config;
mod core;
mod db;
mod errors;
mod models;

use crate::errors::Result;
use dotenvy::dotenv;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file (as early as possible)
    dotenv().ok(); // Non-fatal, env vars can be set externally
    info!("Attempted to load .env file.");

    // 3. Load the application configuration
    let app_config = config::load_app_configuration()?;
    info!("Successfully processed application configuration.");

    // 4. Initialize database
    let db_pool = db::init_db(&app_config.database_path)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Seed the voucher catalogue
    db::seed_initial_vouchers(&db_pool, &app_config.vouchers_from_toml)
        .await
        .inspect(|_| info!("Voucher catalogue seeded successfully."))
        .inspect_err(|e| error!("Failed to seed voucher catalogue: {}", e))?;

    // 6. Run the auto-completion sweep until shutdown
    let rewards = app_config.rewards;
    let mut interval = tokio::time::interval(Duration::from_secs(rewards.sweep_interval_secs));
    info!(
        "Starting auto-completion sweep every {}s ({}-day grace period).",
        rewards.sweep_interval_secs, rewards.auto_complete_days
    );
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match crate::core::run_sweep(&db_pool, rewards.auto_complete_days, rewards.completion_points).await {
                    Ok(result) if result.total() > 0 => info!(
                        "Sweep auto-completed {} orders and {} donation claims.",
                        result.completed_orders.len(),
                        result.completed_claims.len()
                    ),
                    Ok(_) => {}
                    Err(e) => error!("Sweep failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, exiting.");
                break;
            }
        }
    }

    Ok(())
}
