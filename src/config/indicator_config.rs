//! Aggregation and indicator configuration parsing from environment variables.

use crate::application::indicators::ComputeStrategy;
use crate::application::market_data::aggregation_service::BandSettings;
use crate::domain::indicators::IndicatorSpec;
use crate::domain::market::interval::Interval;
use anyhow::{Context, Result, anyhow};
use std::env;

const DEFAULT_INDICATORS: &str = "sma:20,ema:9,rsi:14,bb_width:20:2,atr:14,vwap";

/// Indicator environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorEnvConfig {
    /// Width of the raw candles coming from the source
    pub base_interval: Interval,
    /// Default bucket width for aggregation and indicator requests
    pub interval: Interval,
    pub strategy: ComputeStrategy,
    pub bands: BandSettings,
    /// Indicators computed when a caller does not name any
    pub default_indicators: Vec<IndicatorSpec>,
}

impl Default for IndicatorEnvConfig {
    fn default() -> Self {
        Self {
            base_interval: Interval::ONE_MIN,
            interval: Interval::FIVE_MIN,
            strategy: ComputeStrategy::default(),
            bands: BandSettings::default(),
            default_indicators: parse_indicator_list(DEFAULT_INDICATORS).unwrap_or_default(),
        }
    }
}

impl IndicatorEnvConfig {
    pub fn from_env() -> Result<Self> {
        let base_interval: Interval = super::parse_env("BASE_INTERVAL", Interval::ONE_MIN)?;
        let interval: Interval = super::parse_env("AGGREGATION_INTERVAL", Interval::FIVE_MIN)?;
        if interval.base_candles_per_bucket(base_interval).is_none() {
            return Err(anyhow!(
                "AGGREGATION_INTERVAL {} is not a whole multiple of BASE_INTERVAL {}",
                interval,
                base_interval
            ));
        }

        let defaults = BandSettings::default();
        let bands = BandSettings {
            period: super::parse_env("BB_PERIOD", defaults.period)?,
            multiplier: super::parse_env("BB_MULTIPLIER", defaults.multiplier)?,
            warmup_days: super::parse_env("BB_WARMUP_DAYS", defaults.warmup_days)?,
        };
        if bands.period == 0 {
            return Err(anyhow!("BB_PERIOD must be positive"));
        }
        if !bands.multiplier.is_finite() || bands.multiplier <= 0.0 {
            return Err(anyhow!("BB_MULTIPLIER must be positive, got {}", bands.multiplier));
        }

        let indicators =
            env::var("DEFAULT_INDICATORS").unwrap_or_else(|_| DEFAULT_INDICATORS.to_string());

        Ok(Self {
            base_interval,
            interval,
            strategy: super::parse_env("COMPUTE_STRATEGY", ComputeStrategy::default())?,
            bands,
            default_indicators: parse_indicator_list(&indicators)
                .context("Failed to parse DEFAULT_INDICATORS")?,
        })
    }
}

/// Parses a comma-separated list such as `sma:20,bb_width:20:2,vwap`.
pub fn parse_indicator_list(raw: &str) -> Result<Vec<IndicatorSpec>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| IndicatorSpec::parse(s).map_err(anyhow::Error::from))
        .collect()
}
