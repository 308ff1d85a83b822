//! Indicator cache configuration parsing from environment variables.

use anyhow::{Result, anyhow};

/// Cache environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEnvConfig {
    /// Disabled caching must not change results, only latency
    pub enabled: bool,
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CacheEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

impl CacheEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            enabled: super::parse_bool("CACHE_ENABLED", defaults.enabled),
            max_entries: super::parse_env("CACHE_MAX_ENTRIES", defaults.max_entries)?,
            max_bytes: super::parse_env("CACHE_MAX_BYTES", defaults.max_bytes)?,
        };
        if config.enabled && (config.max_entries == 0 || config.max_bytes == 0) {
            return Err(anyhow!(
                "CACHE_MAX_ENTRIES and CACHE_MAX_BYTES must be positive when the cache is enabled"
            ));
        }
        Ok(config)
    }
}
