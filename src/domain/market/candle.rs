use crate::domain::market::interval::Interval;
use serde::{Deserialize, Serialize};

/// A base OHLCV candle as delivered by the storage or broker collaborator.
///
/// `timestamp` is the bucket start in Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub interval: Interval,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    #[serde(default)]
    pub open_interest: Option<u64>,
}

impl Candle {
    /// `low <= {open, close} <= high` with every price finite.
    pub fn is_consistent(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite())
            && self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// A higher-timeframe candle folded from one or more base candles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedCandle {
    pub symbol: String,
    /// Interval of the base candles that were folded in
    pub source_interval: Interval,
    /// Interval this candle was aggregated into
    pub interval: Interval,
    /// Bucket start (ms)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub open_interest: Option<u64>,
    /// Number of base candles aggregated into this candle
    pub candle_count: usize,
    /// Bollinger band width at this bucket, when computed with aggregation
    pub bb_width: Option<f64>,
    /// Historical minimum band width reported by the reference lookup
    pub baseline_bb_width: Option<f64>,
}

impl AggregatedCandle {
    /// Opens a bucket from its first base candle
    pub fn open_bucket(candle: &Candle, interval: Interval, bucket_start: i64) -> Self {
        Self {
            symbol: candle.symbol.clone(),
            source_interval: candle.interval,
            interval,
            timestamp: bucket_start,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            open_interest: candle.open_interest,
            candle_count: 1,
            bb_width: None,
            baseline_bb_width: None,
        }
    }

    /// Folds a later base candle of the same bucket into this one.
    ///
    /// Open stays with the first candle, close and open interest carry forward
    /// from the latest candle, volume is summed.
    pub fn merge(&mut self, candle: &Candle) {
        if candle.high > self.high {
            self.high = candle.high;
        }
        if candle.low < self.low {
            self.low = candle.low;
        }
        self.close = candle.close;
        self.volume = self.volume.saturating_add(candle.volume);
        if candle.open_interest.is_some() {
            self.open_interest = candle.open_interest;
        }
        self.candle_count += 1;
    }

    /// Checks if this bucket has received every expected base candle
    pub fn is_complete(&self) -> bool {
        self.interval
            .base_candles_per_bucket(self.source_interval)
            .is_some_and(|expected| self.candle_count >= expected)
    }

    /// Nominal end of this bucket (exclusive, ms)
    pub fn end_timestamp(&self) -> i64 {
        self.timestamp + self.interval.to_millis()
    }

    /// Views the aggregated candle as a plain candle of its own interval,
    /// so indicators can run over bucket history.
    pub fn to_candle(&self) -> Candle {
        Candle {
            symbol: self.symbol.clone(),
            interval: self.interval,
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            open_interest: self.open_interest,
        }
    }
}
