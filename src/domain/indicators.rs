//! Indicator vocabulary: kinds, validated parameters, and output series.

use crate::domain::errors::IndicatorError;
use crate::domain::market::interval::Interval;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
    BollingerWidth,
    Atr,
    Vwap,
}

impl IndicatorKind {
    pub fn requires_period(&self) -> bool {
        !matches!(self, IndicatorKind::Vwap)
    }

    pub fn requires_multiplier(&self) -> bool {
        matches!(
            self,
            IndicatorKind::BollingerUpper
                | IndicatorKind::BollingerMiddle
                | IndicatorKind::BollingerLower
                | IndicatorKind::BollingerWidth
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Sma => "SMA",
            IndicatorKind::Ema => "EMA",
            IndicatorKind::Rsi => "RSI",
            IndicatorKind::BollingerUpper => "BB_UPPER",
            IndicatorKind::BollingerMiddle => "BB_MIDDLE",
            IndicatorKind::BollingerLower => "BB_LOWER",
            IndicatorKind::BollingerWidth => "BB_WIDTH",
            IndicatorKind::Atr => "ATR",
            IndicatorKind::Vwap => "VWAP",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndicatorKind {
    type Err = IndicatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sma" => Ok(IndicatorKind::Sma),
            "ema" => Ok(IndicatorKind::Ema),
            "rsi" => Ok(IndicatorKind::Rsi),
            "bb_upper" | "bbu" => Ok(IndicatorKind::BollingerUpper),
            "bb_middle" | "bbm" => Ok(IndicatorKind::BollingerMiddle),
            "bb_lower" | "bbl" => Ok(IndicatorKind::BollingerLower),
            "bb_width" | "bbw" => Ok(IndicatorKind::BollingerWidth),
            "atr" => Ok(IndicatorKind::Atr),
            "vwap" => Ok(IndicatorKind::Vwap),
            other => Err(IndicatorError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Raw, unvalidated parameters as they arrive from callers or configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub period: Option<i64>,
    pub multiplier: Option<f64>,
}

impl IndicatorParams {
    pub fn period(period: i64) -> Self {
        Self {
            period: Some(period),
            multiplier: None,
        }
    }

    pub fn bands(period: i64, multiplier: f64) -> Self {
        Self {
            period: Some(period),
            multiplier: Some(multiplier),
        }
    }
}

/// A validated indicator request: kind plus the parameters that kind needs.
///
/// Deserialization goes through [`IndicatorSpec::new`], so a spec read from
/// JSON is validated exactly like one built in code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IndicatorSpecRecord")]
pub struct IndicatorSpec {
    kind: IndicatorKind,
    period: Option<usize>,
    multiplier: Option<f64>,
}

/// Wire shape of an [`IndicatorSpec`] before validation
#[derive(Deserialize)]
struct IndicatorSpecRecord {
    kind: IndicatorKind,
    #[serde(default)]
    period: Option<i64>,
    #[serde(default)]
    multiplier: Option<f64>,
}

impl TryFrom<IndicatorSpecRecord> for IndicatorSpec {
    type Error = IndicatorError;

    fn try_from(record: IndicatorSpecRecord) -> Result<Self, Self::Error> {
        IndicatorSpec::new(
            record.kind,
            IndicatorParams {
                period: record.period,
                multiplier: record.multiplier,
            },
        )
    }
}

impl IndicatorSpec {
    /// Validates `params` for `kind`. Bad values are rejected, never clamped.
    pub fn new(kind: IndicatorKind, params: IndicatorParams) -> Result<Self, IndicatorError> {
        let period = if kind.requires_period() {
            let raw = params.period.ok_or(IndicatorError::MissingParameter {
                kind,
                name: "period",
            })?;
            if raw <= 0 {
                return Err(IndicatorError::InvalidPeriod { kind, period: raw });
            }
            Some(raw as usize)
        } else {
            None
        };

        let multiplier = if kind.requires_multiplier() {
            let raw = params.multiplier.ok_or(IndicatorError::MissingParameter {
                kind,
                name: "multiplier",
            })?;
            if !raw.is_finite() || raw <= 0.0 {
                return Err(IndicatorError::InvalidMultiplier {
                    kind,
                    multiplier: raw,
                });
            }
            Some(raw)
        } else {
            None
        };

        Ok(Self {
            kind,
            period,
            multiplier,
        })
    }

    /// Parses `kind[:period[:multiplier]]`, e.g. `ema:9`, `bb_width:20:2`, `vwap`.
    pub fn parse(text: &str) -> Result<Self, IndicatorError> {
        let mut parts = text.split(':');
        let kind: IndicatorKind = parts.next().unwrap_or_default().parse()?;

        let period = match parts.next() {
            Some(p) => Some(p.trim().parse::<i64>().map_err(|_| {
                IndicatorError::MalformedParameter {
                    name: "period",
                    value: p.trim().to_string(),
                }
            })?),
            None => None,
        };
        let multiplier = match parts.next() {
            Some(m) => Some(m.trim().parse::<f64>().map_err(|_| {
                IndicatorError::MalformedParameter {
                    name: "multiplier",
                    value: m.trim().to_string(),
                }
            })?),
            None => None,
        };

        Self::new(kind, IndicatorParams { period, multiplier })
    }

    pub fn kind(&self) -> IndicatorKind {
        self.kind
    }

    /// Period for kinds that take one; VWAP has none.
    pub fn period(&self) -> Option<usize> {
        self.period
    }

    pub fn multiplier(&self) -> Option<f64> {
        self.multiplier
    }

    /// Canonical parameter string, e.g. `period=20 multiplier=2`
    pub fn params_key(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if let Some(period) = self.period {
            parts.push(format!("period={}", period));
        }
        if let Some(multiplier) = self.multiplier {
            parts.push(format!("multiplier={}", multiplier));
        }
        parts.join(" ")
    }

    /// Key used in [`IndicatorSet`], e.g. `EMA period=9`
    pub fn key(&self) -> String {
        let params = self.params_key();
        if params.is_empty() {
            self.kind.to_string()
        } else {
            format!("{} {}", self.kind, params)
        }
    }
}

impl fmt::Display for IndicatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One point of an indicator series; `value` is `None` during warm-up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    pub timestamp: i64,
    pub value: Option<f64>,
}

impl IndicatorValue {
    pub fn defined(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
        }
    }

    pub fn undefined(timestamp: i64) -> Self {
        Self {
            timestamp,
            value: None,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }
}

/// Indicator series keyed by [`IndicatorSpec::key`], all on the timestamp axis
/// of the source candles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub symbol: String,
    pub interval: Interval,
    pub series: BTreeMap<String, Vec<IndicatorValue>>,
}

impl IndicatorSet {
    pub fn new(symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            series: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, spec: &IndicatorSpec, values: Vec<IndicatorValue>) {
        self.series.insert(spec.key(), values);
    }

    pub fn get(&self, spec: &IndicatorSpec) -> Option<&[IndicatorValue]> {
        self.series.get(&spec.key()).map(|v| v.as_slice())
    }

    /// Most recent defined value of a series
    pub fn latest(&self, spec: &IndicatorSpec) -> Option<f64> {
        self.get(spec)?.iter().rev().find_map(|v| v.value)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
