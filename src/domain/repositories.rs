//! Repository Pattern Abstractions
//!
//! Persistence is an external collaborator; the engine only needs to read
//! candles by instrument, interval and range, and optionally to write the
//! aggregated candles it produces.

use crate::domain::market::candle::Candle;
use crate::domain::ports::CandleSource;
use anyhow::Result;
use async_trait::async_trait;

/// Repository for persisting and retrieving candles
#[async_trait]
pub trait CandleRepository: CandleSource {
    /// Store candles, replacing any existing candle with the same
    /// symbol, interval and timestamp
    async fn store(&self, candles: &[Candle]) -> Result<()>;

    /// Count stored candles for a symbol across all intervals
    async fn count(&self, symbol: &str) -> Result<usize>;
}
