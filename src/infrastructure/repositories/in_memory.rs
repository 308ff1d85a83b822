//! In-Memory Repository Implementations
//!
//! Thread-safe, in-memory implementation of `domain::repositories::CandleRepository`.
//!
//! # Features
//!
//! - **Thread-safe**: Uses `Arc<RwLock>` for concurrent access
//! - **Ordered**: Candles are kept sorted per (symbol, interval), so range
//!   reads come back in timestamp order as the aggregator requires
//! - **Testing**: Ideal for unit tests, replay and single-process use
//!
//! # Limitations
//!
//! - Data is lost on application restart
//! - Limited by available RAM

use crate::domain::market::candle::Candle;
use crate::domain::market::interval::Interval;
use crate::domain::ports::CandleSource;
use crate::domain::repositories::CandleRepository;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type SeriesKey = (String, Interval);

/// In-memory candle store keyed by (symbol, interval), ordered by timestamp
pub struct InMemoryCandleRepository {
    candles: Arc<RwLock<HashMap<SeriesKey, BTreeMap<i64, Candle>>>>,
}

impl InMemoryCandleRepository {
    pub fn new() -> Self {
        Self {
            candles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Symbols with at least one stored candle, sorted
    pub async fn symbols(&self) -> Vec<String> {
        let guard = self.candles.read().await;
        let mut symbols: Vec<String> = guard.keys().map(|(s, _)| s.clone()).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}

impl Default for InMemoryCandleRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryCandleRepository {
    fn clone(&self) -> Self {
        Self {
            candles: Arc::clone(&self.candles),
        }
    }
}

#[async_trait]
impl CandleSource for InMemoryCandleRepository {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        start: i64,
        end: i64,
    ) -> Result<Vec<Candle>> {
        if start > end {
            return Ok(Vec::new());
        }
        let guard = self.candles.read().await;
        Ok(guard
            .get(&(symbol.to_string(), interval))
            .map(|series| series.range(start..=end).map(|(_, c)| c.clone()).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl CandleRepository for InMemoryCandleRepository {
    async fn store(&self, candles: &[Candle]) -> Result<()> {
        let mut guard = self.candles.write().await;
        for candle in candles {
            guard
                .entry((candle.symbol.clone(), candle.interval))
                .or_default()
                .insert(candle.timestamp, candle.clone());
        }
        Ok(())
    }

    async fn count(&self, symbol: &str) -> Result<usize> {
        let guard = self.candles.read().await;
        Ok(guard
            .iter()
            .filter(|((s, _), _)| s == symbol)
            .map(|(_, series)| series.len())
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(symbol: &str, timestamp: i64, close: f64) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            interval: Interval::ONE_MIN,
            timestamp,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100,
            open_interest: None,
        }
    }

    #[tokio::test]
    async fn test_store_and_fetch_sorted_range() {
        let repo = InMemoryCandleRepository::new();
        repo.store(&[
            candle("NIFTY", 180_000, 3.0),
            candle("NIFTY", 60_000, 1.0),
            candle("NIFTY", 120_000, 2.0),
            candle("BANKNIFTY", 60_000, 9.0),
        ])
        .await
        .unwrap();

        let fetched = repo
            .fetch_candles("NIFTY", Interval::ONE_MIN, 60_000, 120_000)
            .await
            .unwrap();
        assert_eq!(
            fetched.iter().map(|c| c.timestamp).collect::<Vec<_>>(),
            vec![60_000, 120_000]
        );
        assert_eq!(repo.count("NIFTY").await.unwrap(), 3);
        assert_eq!(repo.symbols().await, vec!["BANKNIFTY", "NIFTY"]);
    }

    #[tokio::test]
    async fn test_store_replaces_same_timestamp() {
        let repo = InMemoryCandleRepository::new();
        repo.store(&[candle("X", 60_000, 1.0)]).await.unwrap();
        repo.store(&[candle("X", 60_000, 5.0)]).await.unwrap();

        let fetched = repo
            .fetch_candles("X", Interval::ONE_MIN, 0, i64::MAX)
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].close, 5.0);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_empty() {
        let repo = InMemoryCandleRepository::new();
        let fetched = repo
            .fetch_candles("NONE", Interval::ONE_MIN, 0, 1)
            .await
            .unwrap();
        assert!(fetched.is_empty());
        assert_eq!(repo.count("NONE").await.unwrap(), 0);
    }
}
