//! Observability configuration parsing from environment variables.
//!
//! Metrics are push-only: the reporter writes JSON snapshots to stdout on an
//! interval, nothing listens for requests.

use anyhow::{Result, anyhow};

/// Observability environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ObservabilityEnvConfig {
    pub enabled: bool,
    pub report_interval_secs: u64,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_interval_secs: 60,
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            enabled: super::parse_bool("OBSERVABILITY_ENABLED", defaults.enabled),
            report_interval_secs: super::parse_env(
                "METRICS_REPORT_INTERVAL_SECS",
                defaults.report_interval_secs,
            )?,
        };
        if config.report_interval_secs == 0 {
            return Err(anyhow!("METRICS_REPORT_INTERVAL_SECS must be positive"));
        }
        Ok(config)
    }
}
