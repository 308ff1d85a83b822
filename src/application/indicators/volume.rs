use super::to_series;
use crate::domain::indicators::IndicatorValue;
use crate::domain::market::candle::Candle;

/// Cumulative volume-weighted average of the typical price, anchored at the
/// first candle. Undefined only while no volume has traded yet.
pub fn vwap(candles: &[Candle]) -> Vec<IndicatorValue> {
    let mut pv = 0.0;
    let mut volume = 0.0;
    let values = candles
        .iter()
        .map(|c| {
            let v = c.volume as f64;
            pv += c.typical_price() * v;
            volume += v;
            (volume > 0.0).then(|| pv / volume)
        })
        .collect();
    to_series(candles, values)
}
