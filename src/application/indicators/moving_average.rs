use super::{ComputeStrategy, closes, insufficient_history, to_series, undefined_series};
use crate::domain::indicators::IndicatorValue;
use crate::domain::market::candle::Candle;
use rayon::prelude::*;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

/// Arithmetic mean of the trailing `period` closes; undefined before index `period - 1`.
pub fn sma(candles: &[Candle], period: usize, strategy: ComputeStrategy) -> Vec<IndicatorValue> {
    if insufficient_history(candles, period) {
        return undefined_series(candles);
    }
    let closes = closes(candles);
    let values = match strategy {
        ComputeStrategy::Windowed => sma_windowed(&closes, period),
        ComputeStrategy::Rolling => sma_rolling(&closes, period),
    };
    to_series(candles, values)
}

fn sma_windowed(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .into_par_iter()
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                let window = &closes[i + 1 - period..=i];
                Some(window.iter().sum::<f64>() / period as f64)
            }
        })
        .collect()
}

fn sma_rolling(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let Ok(mut sma) = SimpleMovingAverage::new(period) else {
        return vec![None; closes.len()];
    };
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let value = sma.next(close);
            (i + 1 >= period).then_some(value)
        })
        .collect()
}

/// Exponential moving average seeded with the SMA of the first `period` closes.
///
/// `ema[i] = (close[i] - ema[i-1]) * 2 / (period + 1) + ema[i-1]`
pub fn ema(candles: &[Candle], period: usize) -> Vec<IndicatorValue> {
    if insufficient_history(candles, period) {
        return undefined_series(candles);
    }
    let closes = closes(candles);
    let k = 2.0 / (period as f64 + 1.0);

    let mut values = vec![None; closes.len()];
    let mut prev = closes[..period].iter().sum::<f64>() / period as f64;
    values[period - 1] = Some(prev);

    for i in period..closes.len() {
        prev = (closes[i] - prev) * k + prev;
        values[i] = Some(prev);
    }
    to_series(candles, values)
}
