use super::aggregation_service::BandSettings;
use super::bucket_aggregator::BucketStream;
use crate::application::indicators::volatility::band_width_at;
use crate::domain::errors::DataError;
use crate::domain::market::candle::{AggregatedCandle, Candle};
use crate::domain::market::events::BucketCloseEvent;
use crate::domain::market::interval::Interval;
use crate::domain::market::session::TradingSession;
use crate::domain::ports::BandWidthBaseline;
use crate::infrastructure::event_bus::CloseEventBus;
use crate::infrastructure::observability::Metrics;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Live, multi-instrument bucketing.
///
/// One [`BucketStream`] per instrument. Buckets that close during the same
/// call are grouped by bucket timestamp and published as one
/// [`BucketCloseEvent`] each, oldest first.
pub struct LiveAggregator {
    template: BucketStream,
    streams: HashMap<String, BucketStream>,
    windows: HashMap<String, VecDeque<f64>>,
    bands: BandSettings,
    baseline: Option<Arc<dyn BandWidthBaseline>>,
    bus: CloseEventBus,
    metrics: Option<Metrics>,
}

impl LiveAggregator {
    pub fn new(
        interval: Interval,
        base: Interval,
        session: Arc<TradingSession>,
        bus: CloseEventBus,
    ) -> Result<Self, DataError> {
        Ok(Self {
            template: BucketStream::new(interval, base, session)?,
            streams: HashMap::new(),
            windows: HashMap::new(),
            bands: BandSettings::default(),
            baseline: None,
            bus,
            metrics: None,
        })
    }

    pub fn with_bands(mut self, bands: BandSettings) -> Self {
        self.bands = bands;
        self
    }

    pub fn with_baseline(mut self, baseline: Arc<dyn BandWidthBaseline>) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn interval(&self) -> Interval {
        self.template.interval()
    }

    /// Instruments seen so far
    pub fn instrument_count(&self) -> usize {
        self.streams.len()
    }

    pub async fn on_candle(&mut self, candle: &Candle) -> Vec<BucketCloseEvent> {
        self.on_candles(std::slice::from_ref(candle)).await
    }

    /// Feeds one tick of base candles (any mix of instruments) and publishes
    /// whatever closed.
    pub async fn on_candles(&mut self, candles: &[Candle]) -> Vec<BucketCloseEvent> {
        let mut closed = Vec::new();
        for candle in candles {
            let stream = self
                .streams
                .entry(candle.symbol.clone())
                .or_insert_with(|| self.template.clone());
            closed.extend(stream.push(candle));
        }
        self.publish(closed).await
    }

    /// Closes every open bucket whose window has ended by `now`.
    pub async fn on_clock(&mut self, now: i64) -> Vec<BucketCloseEvent> {
        let closed: Vec<_> = self
            .streams
            .values_mut()
            .filter_map(|s| s.advance_to(now))
            .collect();
        self.publish(closed).await
    }

    /// Closes every open bucket, elapsed or not (end of session, shutdown).
    pub async fn flush_all(&mut self) -> Vec<BucketCloseEvent> {
        let closed: Vec<_> = self.streams.values_mut().filter_map(|s| s.flush()).collect();
        if !closed.is_empty() {
            info!("LiveAggregator: Flushing {} open buckets", closed.len());
        }
        self.publish(closed).await
    }

    async fn publish(&mut self, closed: Vec<AggregatedCandle>) -> Vec<BucketCloseEvent> {
        if closed.is_empty() {
            return Vec::new();
        }

        let mut groups: BTreeMap<i64, Vec<AggregatedCandle>> = BTreeMap::new();
        for bucket in closed {
            let bucket = self.annotate(bucket);
            groups.entry(bucket.timestamp).or_default().push(bucket);
        }

        let interval = self.interval();
        let mut events = Vec::with_capacity(groups.len());
        for (timestamp, mut candles) in groups {
            candles.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            let event = BucketCloseEvent {
                interval,
                timestamp,
                candles,
            };
            let report = self.bus.publish(&event).await;
            debug!(
                "LiveAggregator: {} @ {} closed for {:?} ({} delivered, {} failed)",
                interval,
                timestamp,
                event.symbols(),
                report.delivered,
                report.failed.len()
            );
            if let Some(metrics) = &self.metrics {
                metrics.inc_buckets_closed(&interval.to_string(), event.candles.len());
            }
            events.push(event);
        }
        events
    }

    fn annotate(&mut self, mut bucket: AggregatedCandle) -> AggregatedCandle {
        let period = self.bands.period.max(1);
        let window = self.windows.entry(bucket.symbol.clone()).or_default();
        window.push_back(bucket.close);
        if window.len() > period {
            window.pop_front();
        }
        if window.len() == period {
            bucket.bb_width = band_width_at(window.make_contiguous(), self.bands.multiplier);
        }
        bucket.baseline_bb_width = self
            .baseline
            .as_ref()
            .and_then(|b| b.lowest_width(&bucket.symbol, bucket.interval));
        bucket
    }
}
