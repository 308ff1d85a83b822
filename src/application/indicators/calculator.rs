use super::ComputeStrategy;
use super::moving_average::{ema, sma};
use super::oscillators::rsi;
use super::volatility::{BollingerSeries, atr, bollinger_bands};
use super::volume::vwap;
use crate::domain::errors::IndicatorError;
use crate::domain::indicators::{
    IndicatorKind, IndicatorParams, IndicatorSet, IndicatorSpec, IndicatorValue,
};
use crate::domain::market::candle::Candle;
use crate::domain::market::interval::Interval;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::debug;

/// Dispatches validated indicator specs onto the pure indicator functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorCalculator {
    strategy: ComputeStrategy,
}

impl IndicatorCalculator {
    pub fn new(strategy: ComputeStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ComputeStrategy {
        self.strategy
    }

    /// Validates raw parameters, then computes one series
    pub fn calculate(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        params: IndicatorParams,
        candles: &[Candle],
    ) -> Result<Vec<IndicatorValue>, IndicatorError> {
        let spec = IndicatorSpec::new(kind, params)?;
        self.calculate_indicator(symbol, &spec, candles)
    }

    /// Computes one series, `candles.len()` values long.
    pub fn calculate_indicator(
        &self,
        symbol: &str,
        spec: &IndicatorSpec,
        candles: &[Candle],
    ) -> Result<Vec<IndicatorValue>, IndicatorError> {
        if candles.is_empty() {
            return Err(IndicatorError::EmptySeries {
                symbol: symbol.to_string(),
            });
        }
        self.compute_series(spec, candles)
    }

    /// Computes a series without the empty-input check.
    pub fn compute_series(
        &self,
        spec: &IndicatorSpec,
        candles: &[Candle],
    ) -> Result<Vec<IndicatorValue>, IndicatorError> {
        let series = match spec.kind() {
            IndicatorKind::Sma => sma(candles, period_of(spec)?, self.strategy),
            IndicatorKind::Ema => ema(candles, period_of(spec)?),
            IndicatorKind::Rsi => rsi(candles, period_of(spec)?),
            IndicatorKind::Atr => atr(candles, period_of(spec)?),
            IndicatorKind::Vwap => vwap(candles),
            IndicatorKind::BollingerUpper
            | IndicatorKind::BollingerMiddle
            | IndicatorKind::BollingerLower
            | IndicatorKind::BollingerWidth => {
                let bands = self.bollinger(spec, candles)?;
                pick_band(spec.kind(), bands)
            }
        };
        Ok(series)
    }

    /// Computes every spec over the same candles into one [`IndicatorSet`].
    ///
    /// Bollinger specs sharing a period and multiplier reuse one band computation.
    pub fn calculate_indicator_set(
        &self,
        symbol: &str,
        interval: Interval,
        specs: &[IndicatorSpec],
        candles: &[Candle],
    ) -> Result<IndicatorSet, IndicatorError> {
        if candles.is_empty() {
            return Err(IndicatorError::EmptySeries {
                symbol: symbol.to_string(),
            });
        }

        let mut set = IndicatorSet::new(symbol, interval);
        let mut bands: HashMap<String, BollingerSeries> = HashMap::new();

        for spec in specs {
            let values = if spec.kind().requires_multiplier() {
                let series = match bands.entry(spec.params_key()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => entry.insert(self.bollinger(spec, candles)?),
                };
                pick_band(spec.kind(), series.clone())
            } else {
                self.compute_series(spec, candles)?
            };
            set.insert(spec, values);
        }

        debug!(
            "IndicatorCalculator: {} series for {} {} over {} candles",
            set.len(),
            symbol,
            interval,
            candles.len()
        );
        Ok(set)
    }

    fn bollinger(
        &self,
        spec: &IndicatorSpec,
        candles: &[Candle],
    ) -> Result<BollingerSeries, IndicatorError> {
        let multiplier = spec
            .multiplier()
            .ok_or(IndicatorError::MissingParameter {
                kind: spec.kind(),
                name: "multiplier",
            })?;
        Ok(bollinger_bands(
            candles,
            period_of(spec)?,
            multiplier,
            self.strategy,
        ))
    }
}

fn period_of(spec: &IndicatorSpec) -> Result<usize, IndicatorError> {
    spec.period().ok_or(IndicatorError::MissingParameter {
        kind: spec.kind(),
        name: "period",
    })
}

fn pick_band(kind: IndicatorKind, bands: BollingerSeries) -> Vec<IndicatorValue> {
    match kind {
        IndicatorKind::BollingerUpper => bands.upper,
        IndicatorKind::BollingerLower => bands.lower,
        IndicatorKind::BollingerWidth => bands.width,
        _ => bands.middle,
    }
}
