//! Reward tuning loaded from config.toml.

use serde::Deserialize;

const fn default_completion_points() -> i64 {
    10
}
const fn default_checkin_points() -> i64 {
    1
}
const fn default_auto_complete_days() -> i64 {
    7
}
const fn default_sweep_interval_secs() -> u64 {
    3600
}

/// EcoPoints amounts and timing rules, with the product defaults baked in.
#[derive(Debug, Deserialize, Clone)]
pub struct RewardsConfig {
    /// Points credited per rewarded party when an exchange completes.
    #[serde(default = "default_completion_points")]
    pub completion_points: i64,
    /// Points credited for the daily check-in.
    #[serde(default = "default_checkin_points")]
    pub checkin_points: i64,
    /// Days of counterparty silence before the sweep auto-completes.
    #[serde(default = "default_auto_complete_days")]
    pub auto_complete_days: i64,
    /// How often the daemon runs the sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            completion_points: default_completion_points(),
            checkin_points: default_checkin_points(),
            auto_complete_days: default_auto_complete_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_defaults() {
        let config: RewardsConfig = toml::from_str("").unwrap();
        assert_eq!(config.completion_points, 10);
        assert_eq!(config.checkin_points, 1);
        assert_eq!(config.auto_complete_days, 7);
        assert_eq!(config.sweep_interval_secs, 3600);
    }

    #[test]
    fn test_overrides() {
        let config: RewardsConfig = toml::from_str(
            r#"
            completion_points = 20
            auto_complete_days = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.completion_points, 20);
        assert_eq!(config.auto_complete_days, 3);
        assert_eq!(config.checkin_points, 1, "unset keys keep their defaults");
    }
}
