//! CSV-backed candle source for offline replay.
//!
//! Expected header: `symbol,timestamp,open,high,low,close,volume[,open_interest]`.
//! `timestamp` is either Unix milliseconds or an RFC 3339 datetime.

use crate::domain::market::candle::Candle;
use crate::domain::market::interval::Interval;
use crate::domain::ports::CandleSource;
use crate::domain::repositories::CandleRepository;
use crate::infrastructure::repositories::InMemoryCandleRepository;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct CandleRow {
    symbol: String,
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
    #[serde(default)]
    open_interest: Option<u64>,
}

impl CandleRow {
    fn into_candle(self, interval: Interval) -> Result<Candle> {
        Ok(Candle {
            symbol: self.symbol.trim().to_string(),
            interval,
            timestamp: parse_timestamp(&self.timestamp)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            open_interest: self.open_interest,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| anyhow!("Unrecognised timestamp '{}'", raw))
}

fn parse_rows<R: Read>(reader: R, interval: Interval) -> (Vec<Candle>, usize) {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut candles = Vec::new();
    let mut rejected = 0;

    for (line, result) in reader.deserialize::<CandleRow>().enumerate() {
        match result
            .map_err(anyhow::Error::from)
            .and_then(|row| row.into_candle(interval))
        {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                rejected += 1;
                if rejected <= 10 {
                    // Log first 10 errors only
                    warn!("CsvCandleSource: Skipping row {}: {}", line + 2, e);
                }
            }
        }
    }
    (candles, rejected)
}

/// Candles loaded once from CSV and served from memory
#[derive(Clone)]
pub struct CsvCandleSource {
    store: InMemoryCandleRepository,
    rejected: usize,
}

impl CsvCandleSource {
    pub async fn from_path(path: impl AsRef<Path>, interval: Interval) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let source = Self::from_reader(BufReader::new(file), interval).await?;
        info!(
            "CsvCandleSource: Loaded {:?} ({} rows rejected)",
            path, source.rejected
        );
        Ok(source)
    }

    /// Rows that fail to parse are skipped and counted.
    pub async fn from_reader<R: Read>(reader: R, interval: Interval) -> Result<Self> {
        let (candles, rejected) = parse_rows(reader, interval);
        let store = InMemoryCandleRepository::new();
        store.store(&candles).await?;
        Ok(Self { store, rejected })
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub async fn symbols(&self) -> Vec<String> {
        self.store.symbols().await
    }
}

#[async_trait]
impl CandleSource for CsvCandleSource {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        start: i64,
        end: i64,
    ) -> Result<Vec<Candle>> {
        self.store.fetch_candles(symbol, interval, start, end).await
    }
}
