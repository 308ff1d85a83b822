use crate::domain::errors::DataError;
use crate::domain::market::candle::{AggregatedCandle, Candle};
use crate::domain::market::interval::Interval;
use crate::domain::market::session::TradingSession;
use crate::infrastructure::observability::Metrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Base candles a stream refused to fold in, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipStats {
    pub out_of_session: usize,
    pub inconsistent: usize,
    pub out_of_order: usize,
    pub late: usize,
}

impl SkipStats {
    pub fn total(&self) -> usize {
        self.out_of_session + self.inconsistent + self.out_of_order + self.late
    }

    pub fn record(&self, metrics: &Metrics) {
        metrics.inc_skipped("out_of_session", self.out_of_session);
        metrics.inc_skipped("inconsistent", self.inconsistent);
        metrics.inc_skipped("out_of_order", self.out_of_order);
        metrics.inc_skipped("late", self.late);
    }
}

/// Incremental bucketing of one instrument's base candles into one interval.
///
/// At most one bucket is open at a time. A bucket closes when its last base
/// slot arrives, when a candle for a later bucket arrives, when the clock
/// passes its end, or on flush. Closed buckets are never reopened.
#[derive(Debug, Clone)]
pub struct BucketStream {
    interval: Interval,
    base: Interval,
    session: Arc<TradingSession>,
    active: Option<AggregatedCandle>,
    active_end: i64,
    expected: usize,
    last_timestamp: Option<i64>,
    last_closed: Option<i64>,
    skipped: SkipStats,
}

impl BucketStream {
    pub fn new(
        interval: Interval,
        base: Interval,
        session: Arc<TradingSession>,
    ) -> Result<Self, DataError> {
        if interval.base_candles_per_bucket(base).is_none() {
            return Err(DataError::IncompatibleInterval {
                requested: interval.to_string(),
                base: base.to_string(),
            });
        }
        Ok(Self {
            interval,
            base,
            session,
            active: None,
            active_end: 0,
            expected: 0,
            last_timestamp: None,
            last_closed: None,
            skipped: SkipStats::default(),
        })
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// The bucket currently being built, if any
    pub fn active(&self) -> Option<&AggregatedCandle> {
        self.active.as_ref()
    }

    pub fn skipped(&self) -> SkipStats {
        self.skipped
    }

    /// Folds one base candle in and returns the buckets it closed (0, 1 or 2).
    pub fn push(&mut self, candle: &Candle) -> Vec<AggregatedCandle> {
        let mut closed = Vec::new();

        if !candle.is_consistent() {
            warn!(
                "BucketStream: Skipping inconsistent candle {} @ {}",
                candle.symbol, candle.timestamp
            );
            self.skipped.inconsistent += 1;
            return closed;
        }

        let Some(bucket_start) = self.session.bucket_start(candle.timestamp, self.interval) else {
            debug!(
                "BucketStream: {} @ {} outside session",
                candle.symbol, candle.timestamp
            );
            self.skipped.out_of_session += 1;
            return closed;
        };

        if self.last_timestamp.is_some_and(|last| candle.timestamp <= last) {
            warn!(
                "BucketStream: Out-of-order candle {} @ {} (last {:?})",
                candle.symbol, candle.timestamp, self.last_timestamp
            );
            self.skipped.out_of_order += 1;
            return closed;
        }

        if self.last_closed.is_some_and(|last| bucket_start <= last) {
            warn!(
                "BucketStream: Late candle {} @ {} for closed bucket {}",
                candle.symbol, candle.timestamp, bucket_start
            );
            self.skipped.late += 1;
            return closed;
        }

        self.last_timestamp = Some(candle.timestamp);

        match self.active.as_mut() {
            Some(active) if active.timestamp == bucket_start => active.merge(candle),
            _ => {
                closed.extend(self.close_active());
                self.open(candle, bucket_start);
            }
        }

        let last_slot = candle.timestamp + self.base.to_millis() >= self.active_end;
        let full = self
            .active
            .as_ref()
            .is_some_and(|a| a.candle_count >= self.expected);
        if last_slot || full {
            closed.extend(self.close_active());
        }
        closed
    }

    /// Closes the open bucket once `now` has reached its end.
    pub fn advance_to(&mut self, now: i64) -> Option<AggregatedCandle> {
        if self.active.is_some() && now >= self.active_end {
            return self.close_active();
        }
        None
    }

    /// Closes the open bucket regardless of how much of it has elapsed.
    pub fn flush(&mut self) -> Option<AggregatedCandle> {
        self.close_active()
    }

    fn open(&mut self, candle: &Candle, bucket_start: i64) {
        self.active_end = self.session.bucket_end(bucket_start, self.interval);
        self.expected = ((self.active_end - bucket_start) / self.base.to_millis()).max(1) as usize;
        self.active = Some(AggregatedCandle::open_bucket(
            candle,
            self.interval,
            bucket_start,
        ));
    }

    fn close_active(&mut self) -> Option<AggregatedCandle> {
        let mut closed = self.active.take()?;
        closed.source_interval = self.base;
        self.last_closed = Some(closed.timestamp);
        Some(closed)
    }
}

/// Batch bucketing over a sorted candle run that may mix instruments.
#[derive(Debug, Clone)]
pub struct BucketAggregator {
    session: Arc<TradingSession>,
    base: Interval,
    metrics: Option<Metrics>,
}

impl BucketAggregator {
    pub fn new(session: Arc<TradingSession>, base: Interval) -> Self {
        Self {
            session,
            base,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn base(&self) -> Interval {
        self.base
    }

    pub fn session(&self) -> &Arc<TradingSession> {
        &self.session
    }

    /// Groups `candles` into `interval` buckets per instrument.
    ///
    /// A trailing partial bucket is kept only if `query_end` has reached its
    /// end, or when `flush` is set. Output is ordered by timestamp, then symbol.
    pub fn aggregate(
        &self,
        candles: &[Candle],
        interval: Interval,
        query_end: i64,
        flush: bool,
    ) -> Result<Vec<AggregatedCandle>, DataError> {
        let template = BucketStream::new(interval, self.base, self.session.clone())?;
        let mut streams: BTreeMap<&str, BucketStream> = BTreeMap::new();
        let mut out = Vec::new();

        for candle in candles {
            let stream = streams
                .entry(candle.symbol.as_str())
                .or_insert_with(|| template.clone());
            out.extend(stream.push(candle));
        }

        let mut skipped = SkipStats::default();
        for stream in streams.values_mut() {
            let tail = if flush {
                stream.flush()
            } else {
                stream.advance_to(query_end)
            };
            out.extend(tail);

            let s = stream.skipped();
            skipped.out_of_session += s.out_of_session;
            skipped.inconsistent += s.inconsistent;
            skipped.out_of_order += s.out_of_order;
            skipped.late += s.late;
        }

        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.symbol.cmp(&b.symbol)));

        if let Some(metrics) = &self.metrics {
            metrics.inc_buckets_closed(&interval.to_string(), out.len());
            skipped.record(metrics);
        }
        debug!(
            "BucketAggregator: {} candles -> {} {} buckets ({} skipped)",
            candles.len(),
            out.len(),
            interval,
            skipped.total()
        );
        Ok(out)
    }
}
