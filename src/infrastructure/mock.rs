//! Synthetic candle source for demos, replay smoke tests and load tests.

use crate::domain::market::candle::Candle;
use crate::domain::market::interval::Interval;
use crate::domain::market::session::TradingSession;
use crate::domain::ports::CandleSource;
use anyhow::{Result, bail};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::debug;

const DAY_MS: i64 = 86_400_000;
const MAX_SPAN_DAYS: i64 = 366;

/// Deterministic random-walk candles inside the trading session.
///
/// Each (symbol, day) walk is seeded independently, so overlapping fetches
/// return identical candles.
#[derive(Clone)]
pub struct SyntheticCandleSource {
    session: Arc<TradingSession>,
    seed: u64,
    start_price: f64,
    /// Max relative move per candle (0.002 = 0.2%)
    volatility: f64,
}

impl SyntheticCandleSource {
    pub fn new(session: Arc<TradingSession>, seed: u64) -> Self {
        Self {
            session,
            seed,
            start_price: 100.0,
            volatility: 0.002,
        }
    }

    pub fn with_start_price(mut self, price: f64) -> Self {
        self.start_price = price;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility.abs();
        self
    }

    fn day_rng(&self, symbol: &str, session_open: i64) -> StdRng {
        // FNV-1a, stable across runs unlike the std hasher
        let symbol_hash = symbol.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        });
        let day = session_open.div_euclid(DAY_MS) as u64;
        StdRng::seed_from_u64(self.seed ^ symbol_hash ^ day.rotate_left(32))
    }

    /// Every candle of one session, open to close inclusive.
    fn session_candles(&self, symbol: &str, interval: Interval, session_open: i64) -> Vec<Candle> {
        let Some(close) = self.session.session_close_at(session_open) else {
            return Vec::new();
        };
        let mut rng = self.day_rng(symbol, session_open);
        let mut price = self.start_price * (1.0 + rng.random_range(-0.05..=0.05));
        let step = interval.to_millis();
        let mut candles = Vec::with_capacity(((close - session_open) / step + 1) as usize);

        let mut ts = session_open;
        while ts <= close {
            let open = price;
            let close_price = (open * (1.0 + rng.random_range(-self.volatility..=self.volatility)))
                .max(0.01);
            let wick = open.max(close_price) * rng.random_range(0.0..=self.volatility / 2.0);
            let high = open.max(close_price) + wick;
            let low = (open.min(close_price) - wick).max(0.01);
            candles.push(Candle {
                symbol: symbol.to_string(),
                interval,
                timestamp: ts,
                open,
                high,
                low,
                close: close_price,
                volume: rng.random_range(100..=5_000),
                open_interest: None,
            });
            price = close_price;
            ts += step;
        }
        candles
    }
}

#[async_trait]
impl CandleSource for SyntheticCandleSource {
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
        if (end - start) / DAY_MS > MAX_SPAN_DAYS {
            bail!(
                "Synthetic range for {} spans more than {} days",
                symbol,
                MAX_SPAN_DAYS
            );
        }
        let Some(mut open) = self.session.session_open_at(start) else {
            return Ok(Vec::new());
        };

        let mut candles = Vec::new();
        while open <= end {
            if self.session.is_trading_day(open) {
                candles.extend(
                    self.session_candles(symbol, interval, open)
                        .into_iter()
                        .filter(|c| c.timestamp >= start && c.timestamp <= end),
                );
            }
            open += DAY_MS;
        }
        debug!(
            "SyntheticCandleSource: {} candles for {} [{}, {}]",
            candles.len(),
            symbol,
            start,
            end
        );
        Ok(candles)
    }
}
