use super::bucket_aggregator::{BucketAggregator, BucketStream};
use crate::application::indicators::volatility::band_width_at;
use crate::application::pipeline::cancellation::CancelSignal;
use crate::domain::errors::{DataError, EngineError};
use crate::domain::market::candle::{AggregatedCandle, Candle};
use crate::domain::market::events::BucketCloseEvent;
use crate::domain::market::interval::Interval;
use crate::domain::ports::{BandWidthBaseline, CandleSource};
use crate::infrastructure::event_bus::CloseEventBus;
use crate::infrastructure::observability::Metrics;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info};

const DAY_MS: i64 = 86_400_000;

/// Band settings used to annotate streamed buckets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSettings {
    pub period: usize,
    pub multiplier: f64,
    /// Calendar days of history fetched before `start` to prime the bands
    pub warmup_days: i64,
}

impl Default for BandSettings {
    fn default() -> Self {
        Self {
            period: 20,
            multiplier: 2.0,
            warmup_days: 5,
        }
    }
}

/// Pulls base candles from a [`CandleSource`] and turns them into
/// session-aligned buckets, either all at once or bucket by bucket.
pub struct AggregationService {
    source: Arc<dyn CandleSource>,
    aggregator: BucketAggregator,
    interval: Interval,
    bands: BandSettings,
    baseline: Option<Arc<dyn BandWidthBaseline>>,
    bus: Option<CloseEventBus>,
    metrics: Option<Metrics>,
}

impl AggregationService {
    pub fn new(
        source: Arc<dyn CandleSource>,
        aggregator: BucketAggregator,
        interval: Interval,
    ) -> Self {
        Self {
            source,
            aggregator,
            interval,
            bands: BandSettings::default(),
            baseline: None,
            bus: None,
            metrics: None,
        }
    }

    pub fn with_bands(mut self, bands: BandSettings) -> Self {
        self.bands = bands;
        self
    }

    pub fn with_baseline(mut self, baseline: Arc<dyn BandWidthBaseline>) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Streamed buckets are also published here, after `on_close`
    pub fn with_bus(mut self, bus: CloseEventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn aggregator(&self) -> &BucketAggregator {
        &self.aggregator
    }

    /// Fetches base candles for `[start, end]`, racing the cancel signal.
    pub async fn fetch(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        cancel: &CancelSignal,
    ) -> Result<Vec<Candle>, EngineError> {
        if start > end {
            return Err(DataError::InvalidRange {
                symbol: symbol.to_string(),
                start,
                end,
            }
            .into());
        }
        cancel.check()?;

        let base = self.aggregator.base();
        let fetched = tokio::select! {
            result = self.source.fetch_candles(symbol, base, start, end) => result,
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
        };

        fetched.map_err(|e| {
            error!("AggregationService: Fetch failed for {}: {:#}", symbol, e);
            EngineError::Data(DataError::Source {
                symbol: symbol.to_string(),
                reason: format!("{:#}", e),
            })
        })
    }

    /// Buckets for `[start, end]` at the configured interval.
    pub async fn aggregate(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        cancel: &CancelSignal,
    ) -> Result<Vec<AggregatedCandle>, EngineError> {
        self.aggregate_into(symbol, self.interval, start, end, false, cancel)
            .await
    }

    /// Buckets for `[start, end]` at `interval`.
    ///
    /// `end` is the timestamp of the last base candle wanted, so a trailing
    /// bucket counts as elapsed once `end` covers its final base slot.
    pub async fn aggregate_into(
        &self,
        symbol: &str,
        interval: Interval,
        start: i64,
        end: i64,
        flush: bool,
        cancel: &CancelSignal,
    ) -> Result<Vec<AggregatedCandle>, EngineError> {
        let candles = self.fetch(symbol, start, end, cancel).await?;
        let query_end = end.saturating_add(self.aggregator.base().to_millis());
        let buckets = self
            .aggregator
            .aggregate(&candles, interval, query_end, flush)?;

        // A cancel that lands mid-way discards the result
        cancel.check()?;
        debug!(
            "AggregationService: {} {} buckets for {} in [{}, {}]",
            buckets.len(),
            interval,
            symbol,
            start,
            end
        );
        Ok(buckets)
    }

    /// Replays `[start, end]` bucket by bucket.
    ///
    /// Each bucket is annotated with the band width over the trailing
    /// `period` buckets (history before `start` primes the window but is
    /// never emitted), passed to `on_close`, then published on the bus
    /// before the next bucket is looked at. Returns the number emitted.
    pub async fn aggregate_streaming<F>(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        mut on_close: F,
        cancel: &CancelSignal,
    ) -> Result<usize, EngineError>
    where
        F: FnMut(&AggregatedCandle) + Send,
    {
        let warmup_start = start.saturating_sub(self.bands.warmup_days.max(0) * DAY_MS);
        let candles = self.fetch(symbol, warmup_start, end, cancel).await?;

        let mut stream = BucketStream::new(
            self.interval,
            self.aggregator.base(),
            self.aggregator.session().clone(),
        )?;
        let period = self.bands.period.max(1);
        let mut window: VecDeque<f64> = VecDeque::with_capacity(period + 1);
        let baseline = self
            .baseline
            .as_ref()
            .and_then(|b| b.lowest_width(symbol, self.interval));
        let mut emitted = 0usize;

        let query_end = end.saturating_add(self.aggregator.base().to_millis());
        let mut pending: Vec<AggregatedCandle> = Vec::new();

        for (i, candle) in candles.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "AggregationService: Streaming {} cancelled after {} buckets",
                    symbol, emitted
                );
                return Err(EngineError::Cancelled);
            }
            pending.extend(stream.push(candle));
            if i + 1 == candles.len() {
                pending.extend(stream.advance_to(query_end));
            }

            for mut bucket in pending.drain(..) {
                window.push_back(bucket.close);
                if window.len() > period {
                    window.pop_front();
                }
                if bucket.timestamp < start {
                    continue;
                }

                if window.len() == period {
                    bucket.bb_width =
                        band_width_at(window.make_contiguous(), self.bands.multiplier);
                }
                bucket.baseline_bb_width = baseline;

                on_close(&bucket);
                if let Some(bus) = &self.bus {
                    bus.publish(&BucketCloseEvent::single(bucket)).await;
                }
                emitted += 1;
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.inc_buckets_closed(&self.interval.to_string(), emitted);
            stream.skipped().record(metrics);
        }
        info!(
            "AggregationService: Streamed {} {} buckets for {}",
            emitted, self.interval, symbol
        );
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::events::FnCloseListener;
    use crate::domain::market::session::TradingSession;
    use crate::domain::repositories::CandleRepository;
    use crate::infrastructure::repositories::InMemoryCandleRepository;
    use chrono::{FixedOffset, TimeZone};
    use std::sync::Mutex;

    fn ist(day: u32, h: u32, m: u32) -> i64 {
        FixedOffset::east_opt(19_800)
            .unwrap()
            .with_ymd_and_hms(2024, 1, day, h, m, 0)
            .unwrap()
            .timestamp_millis()
    }

    fn minute(symbol: &str, ts: i64, price: f64) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            interval: Interval::ONE_MIN,
            timestamp: ts,
            open: price,
            high: price + 0.5,
            low: price - 0.5,
            close: price,
            volume: 100,
            open_interest: None,
        }
    }

    /// One candle per minute from 09:15 to 09:44 on each given day
    async fn repository(days: &[u32]) -> Arc<InMemoryCandleRepository> {
        let repo = Arc::new(InMemoryCandleRepository::new());
        let mut candles = Vec::new();
        for &day in days {
            for m in 0..30 {
                let ts = ist(day, 9, 15) + m * 60_000;
                candles.push(minute("NIFTY", ts, 100.0 + (m % 7) as f64));
            }
        }
        repo.store(&candles).await.unwrap();
        repo
    }

    fn service(repo: Arc<InMemoryCandleRepository>) -> AggregationService {
        let aggregator = BucketAggregator::new(Arc::new(TradingSession::default()), Interval::ONE_MIN);
        AggregationService::new(repo, aggregator, Interval::FIVE_MIN)
    }

    #[tokio::test]
    async fn test_aggregate_range() {
        let svc = service(repository(&[2]).await);
        let buckets = svc
            .aggregate("NIFTY", ist(2, 9, 15), ist(2, 9, 44), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(buckets.len(), 6);
        assert!(buckets.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(buckets.iter().all(|b| b.candle_count == 5));
    }

    #[tokio::test]
    async fn test_invalid_range() {
        let svc = service(repository(&[2]).await);
        let err = svc
            .aggregate("NIFTY", ist(2, 10, 0), ist(2, 9, 0), &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Data(DataError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let svc = service(repository(&[2]).await);
        let (handle, signal) = crate::application::pipeline::cancellation::cancellation();
        handle.cancel();
        let err = svc
            .aggregate("NIFTY", ist(2, 9, 15), ist(2, 9, 44), &signal)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }

    #[tokio::test]
    async fn test_streaming_primes_and_orders() {
        // Jan 1 primes the band window, Jan 2 is streamed
        let bus = CloseEventBus::new();
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = published.clone();
        bus.subscribe(Arc::new(FnCloseListener::new("sink", move |e| {
            sink.lock().unwrap().push(e.timestamp);
            Ok(())
        })))
        .await;

        let svc = service(repository(&[1, 2]).await)
            .with_bands(BandSettings {
                period: 4,
                multiplier: 2.0,
                warmup_days: 2,
            })
            .with_bus(bus);

        let mut seen = Vec::new();
        let count = svc
            .aggregate_streaming(
                "NIFTY",
                ist(2, 9, 15),
                ist(2, 9, 44),
                |b| seen.push((b.timestamp, b.bb_width)),
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(count, 6);
        assert_eq!(seen.len(), 6);
        assert!(seen.iter().all(|(ts, _)| *ts >= ist(2, 9, 15)));
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
        // primed by the previous session, so even the first bucket has a width
        assert!(seen[0].1.is_some_and(|w| w > 0.0));
        assert_eq!(
            *published.lock().unwrap(),
            seen.iter().map(|(ts, _)| *ts).collect::<Vec<_>>()
        );
    }
}
