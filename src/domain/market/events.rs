use crate::domain::market::candle::AggregatedCandle;
use crate::domain::market::interval::Interval;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Buckets that closed together: same interval, same bucket timestamp,
/// possibly spanning several instruments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketCloseEvent {
    pub interval: Interval,
    pub timestamp: i64,
    pub candles: Vec<AggregatedCandle>,
}

impl BucketCloseEvent {
    pub fn single(candle: AggregatedCandle) -> Self {
        Self {
            interval: candle.interval,
            timestamp: candle.timestamp,
            candles: vec![candle],
        }
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.candles.iter().map(|c| c.symbol.as_str()).collect()
    }
}

/// Subscriber to "aggregated candle closed" notifications.
///
/// Errors are reported back to the registry, which logs them and keeps
/// notifying the remaining listeners.
pub trait CloseListener: Send + Sync {
    fn name(&self) -> &str {
        "anonymous"
    }

    fn on_close(&self, event: &BucketCloseEvent) -> Result<()>;
}

/// Adapts a closure into a [`CloseListener`]
pub struct FnCloseListener<F> {
    name: String,
    callback: F,
}

impl<F> FnCloseListener<F>
where
    F: Fn(&BucketCloseEvent) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> CloseListener for FnCloseListener<F>
where
    F: Fn(&BucketCloseEvent) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_close(&self, event: &BucketCloseEvent) -> Result<()> {
        (self.callback)(event)
    }
}

/// Logs every closed bucket at info level
pub struct LoggingCloseListener;

impl CloseListener for LoggingCloseListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_close(&self, event: &BucketCloseEvent) -> Result<()> {
        for candle in &event.candles {
            info!(
                "Bucket closed [{} {}] ts={} O:{} H:{} L:{} C:{} V:{} BBW:{:?}",
                candle.symbol,
                candle.interval,
                candle.timestamp,
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume,
                candle.bb_width
            );
        }
        Ok(())
    }
}
