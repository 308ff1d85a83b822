use super::{closes, insufficient_history, to_series, undefined_series};
use crate::domain::indicators::IndicatorValue;
use crate::domain::market::candle::Candle;

/// Relative Strength Index with Wilder's smoothing.
///
/// The first average gain/loss is the simple mean of the first `period`
/// deltas, so the first `period` entries are undefined. Output stays in `[0, 100]`.
pub fn rsi(candles: &[Candle], period: usize) -> Vec<IndicatorValue> {
    if insufficient_history(candles, period) {
        return undefined_series(candles);
    }
    let closes = closes(candles);
    let p = period as f64;
    let mut values = vec![None; closes.len()];

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for i in 1..=period {
        let delta = closes[i] - closes[i - 1];
        if delta > 0.0 {
            gain_sum += delta;
        } else {
            loss_sum -= delta;
        }
    }

    let mut avg_gain = gain_sum / p;
    let mut avg_loss = loss_sum / p;
    values[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in (period + 1)..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let (gain, loss) = if delta > 0.0 {
            (delta, 0.0)
        } else {
            (0.0, -delta)
        };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        values[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    to_series(candles, values)
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // Flat window reads as neutral
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}
