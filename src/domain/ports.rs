use crate::domain::market::candle::Candle;
use crate::domain::market::interval::Interval;
use anyhow::Result;
use async_trait::async_trait;

/// Supplier of raw candles (storage or broker collaborator).
///
/// Implementations must return candles sorted by timestamp, covering the
/// inclusive range `[start, end]` in milliseconds.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        start: i64,
        end: i64,
    ) -> Result<Vec<Candle>>;
}

/// Reference lookup for the lowest historical Bollinger band width of an
/// instrument. Ingestion and freshness of the reference data belong to the
/// collaborator.
pub trait BandWidthBaseline: Send + Sync {
    fn lowest_width(&self, symbol: &str, interval: Interval) -> Option<f64>;
}
