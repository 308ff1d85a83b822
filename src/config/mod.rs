//! Configuration module for ohlcflow.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by concern: Session, Indicators, Cache, Pipeline, and Observability.

mod cache_config;
mod indicator_config;
mod observability_config;
mod pipeline_config;
mod session_config;

pub use cache_config::CacheEnvConfig;
pub use indicator_config::{IndicatorEnvConfig, parse_indicator_list};
pub use observability_config::ObservabilityEnvConfig;
pub use pipeline_config::PipelineEnvConfig;
pub use session_config::SessionEnvConfig;

use anyhow::{Context, Result, anyhow};
use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub session: SessionEnvConfig,
    pub indicators: IndicatorEnvConfig,
    pub cache: CacheEnvConfig,
    pub pipeline: PipelineEnvConfig,
    pub observability: ObservabilityEnvConfig,
    /// Instruments used by the binaries when none are given on the command line
    pub symbols: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let symbols_str = env::var("SYMBOLS").unwrap_or_else(|_| "NIFTY,BANKNIFTY".to_string());
        let symbols: Vec<String> = symbols_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            session: SessionEnvConfig::from_env()?,
            indicators: IndicatorEnvConfig::from_env()?,
            cache: CacheEnvConfig::from_env()?,
            pipeline: PipelineEnvConfig::from_env()?,
            observability: ObservabilityEnvConfig::from_env()?,
            symbols,
        })
    }
}

/// Reads `key`, falling back to `default` when unset. A set but unparsable
/// value is an error, never silently replaced.
pub(crate) fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{}", e))
            .context(format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse::<bool>()
        .unwrap_or(default)
}
