//! Technical indicator library.
//!
//! Every function maps `n` candles to exactly `n` values, warm-up entries
//! first. None of them hold locks or touch shared state.

pub mod calculator;
pub mod moving_average;
pub mod oscillators;
pub mod service;
pub mod volatility;
pub mod volume;

use crate::domain::indicators::IndicatorValue;
use crate::domain::market::candle::Candle;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use calculator::IndicatorCalculator;
pub use service::{IndicatorRequest, IndicatorService};

/// Algorithm used for windowed indicators (SMA, Bollinger bands).
///
/// Recursive indicators (EMA, RSI, ATR, VWAP) have a single implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputeStrategy {
    /// Incremental updates through `ta` indicators, O(n)
    #[default]
    Rolling,
    /// Each window recomputed independently, parallel across indices
    Windowed,
}

impl FromStr for ComputeStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rolling" | "incremental" => Ok(ComputeStrategy::Rolling),
            "windowed" | "naive" => Ok(ComputeStrategy::Windowed),
            _ => Err(anyhow!(
                "Invalid COMPUTE_STRATEGY: {}. Must be 'rolling' or 'windowed'",
                s
            )),
        }
    }
}

impl fmt::Display for ComputeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeStrategy::Rolling => write!(f, "rolling"),
            ComputeStrategy::Windowed => write!(f, "windowed"),
        }
    }
}

/// All-undefined series on the candles' timestamp axis
pub(crate) fn undefined_series(candles: &[Candle]) -> Vec<IndicatorValue> {
    candles
        .iter()
        .map(|c| IndicatorValue::undefined(c.timestamp))
        .collect()
}

/// A period at or beyond the series length leaves nothing to compute
pub(crate) fn insufficient_history(candles: &[Candle], period: usize) -> bool {
    period == 0 || period >= candles.len()
}

pub(crate) fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Zips raw values onto the candles' timestamps; non-finite values become undefined
pub(crate) fn to_series(candles: &[Candle], values: Vec<Option<f64>>) -> Vec<IndicatorValue> {
    candles
        .iter()
        .zip(values)
        .map(|(c, v)| IndicatorValue {
            timestamp: c.timestamp,
            value: v.filter(|x| x.is_finite()),
        })
        .collect()
}
