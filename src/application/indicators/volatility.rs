use super::{ComputeStrategy, closes, insufficient_history, to_series, undefined_series};
use crate::domain::indicators::IndicatorValue;
use crate::domain::market::candle::Candle;
use rayon::prelude::*;
use statrs::statistics::Statistics;
use ta::Next;
use ta::indicators::BollingerBands;

/// The four Bollinger series, index-aligned with the input candles.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub upper: Vec<IndicatorValue>,
    pub middle: Vec<IndicatorValue>,
    pub lower: Vec<IndicatorValue>,
    pub width: Vec<IndicatorValue>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bands {
    upper: f64,
    middle: f64,
    lower: f64,
}

/// Deviation below this fraction of the mean is rounding noise, not dispersion
const FLAT_TOLERANCE: f64 = 1e-12;

/// A flat window (every close equal, or spread lost in rounding) has no bands
fn is_flat(window: &[f64], mean: f64, std_dev: f64) -> bool {
    window.iter().all(|x| *x == window[0]) || std_dev <= FLAT_TOLERANCE * mean.abs()
}

impl Bands {
    fn from_mean_and_deviation(mean: f64, std_dev: f64, multiplier: f64) -> Option<Self> {
        let bands = Self {
            upper: mean + multiplier * std_dev,
            middle: mean,
            lower: mean - multiplier * std_dev,
        };
        bands.is_ordered().then_some(bands)
    }

    /// A window without dispersion has collapsed bands and stays undefined
    fn is_ordered(&self) -> bool {
        self.upper.is_finite()
            && self.lower.is_finite()
            && self.upper > self.middle
            && self.middle > self.lower
    }

    fn width(&self) -> Option<f64> {
        if self.middle <= 0.0 {
            return None;
        }
        let width = (self.upper - self.lower) / self.middle;
        (width.is_finite() && width > 0.0).then_some(width)
    }
}

/// Bollinger bands over closes: middle = SMA(period), bands at
/// `multiplier` population standard deviations.
pub fn bollinger_bands(
    candles: &[Candle],
    period: usize,
    multiplier: f64,
    strategy: ComputeStrategy,
) -> BollingerSeries {
    if insufficient_history(candles, period) || !(multiplier.is_finite() && multiplier > 0.0) {
        return BollingerSeries {
            upper: undefined_series(candles),
            middle: undefined_series(candles),
            lower: undefined_series(candles),
            width: undefined_series(candles),
        };
    }

    let closes = closes(candles);
    let bands = match strategy {
        ComputeStrategy::Windowed => bands_windowed(&closes, period, multiplier),
        ComputeStrategy::Rolling => bands_rolling(&closes, period, multiplier),
    };

    BollingerSeries {
        upper: to_series(candles, bands.iter().map(|b| b.map(|b| b.upper)).collect()),
        middle: to_series(candles, bands.iter().map(|b| b.map(|b| b.middle)).collect()),
        lower: to_series(candles, bands.iter().map(|b| b.map(|b| b.lower)).collect()),
        width: to_series(candles, bands.iter().map(|b| b.and_then(|b| b.width())).collect()),
    }
}

fn bands_windowed(closes: &[f64], period: usize, multiplier: f64) -> Vec<Option<Bands>> {
    (0..closes.len())
        .into_par_iter()
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &closes[i + 1 - period..=i];
            let mean = window.iter().sum::<f64>() / period as f64;
            let std_dev = window.iter().population_std_dev();
            if is_flat(window, mean, std_dev) {
                return None;
            }
            Bands::from_mean_and_deviation(mean, std_dev, multiplier)
        })
        .collect()
}

fn bands_rolling(closes: &[f64], period: usize, multiplier: f64) -> Vec<Option<Bands>> {
    let Ok(mut bb) = BollingerBands::new(period, multiplier) else {
        return vec![None; closes.len()];
    };
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let out = bb.next(close);
            if i + 1 < period {
                return None;
            }
            let std_dev = (out.upper - out.average) / multiplier;
            if is_flat(&closes[i + 1 - period..=i], out.average, std_dev) {
                return None;
            }
            let bands = Bands {
                upper: out.upper,
                middle: out.average,
                lower: out.lower,
            };
            bands.is_ordered().then_some(bands)
        })
        .collect()
}

/// Band width `(upper - lower) / middle` of a single trailing window of closes.
///
/// Used by streaming aggregation, which only needs the latest value.
pub fn band_width_at(window: &[f64], multiplier: f64) -> Option<f64> {
    if window.is_empty() || !(multiplier.is_finite() && multiplier > 0.0) {
        return None;
    }
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let std_dev = window.iter().population_std_dev();
    if is_flat(window, mean, std_dev) {
        return None;
    }
    Bands::from_mean_and_deviation(mean, std_dev, multiplier)?.width()
}

/// True range of `candle` given the previous close
fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    let hl = candle.high - candle.low;
    let hc = (candle.high - prev_close).abs();
    let lc = (candle.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Average true range with Wilder's smoothing.
///
/// True range needs a previous close, so the seed at index `period` is the
/// mean of TR over indices `1..=period`. Zero-range stretches stay undefined.
pub fn atr(candles: &[Candle], period: usize) -> Vec<IndicatorValue> {
    if insufficient_history(candles, period) {
        return undefined_series(candles);
    }
    let p = period as f64;
    let tr: Vec<f64> = candles
        .windows(2)
        .map(|pair| true_range(&pair[1], pair[0].close))
        .collect();

    let mut values = vec![None; candles.len()];
    let mut prev = tr[..period].iter().sum::<f64>() / p;
    values[period] = Some(prev);

    for i in (period + 1)..candles.len() {
        prev = (prev * (p - 1.0) + tr[i - 1]) / p;
        values[i] = Some(prev);
    }

    let values = values
        .into_iter()
        .map(|v| v.filter(|x| *x > 0.0))
        .collect();
    to_series(candles, values)
}
