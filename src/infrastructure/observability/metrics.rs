//! Prometheus metrics definitions for ohlcflow
//!
//! All metrics use the `ohlcflow_` prefix and are read-only.

use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::fmt;
use std::sync::Arc;

/// Prometheus metrics for the aggregation engine
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Uptime in seconds
    pub uptime_seconds: GenericGauge<AtomicF64>,
    /// Indicator cache lookups by outcome (hit/miss)
    pub cache_requests_total: CounterVec,
    /// Entries currently held by the indicator cache
    pub cache_entries: GenericGauge<AtomicF64>,
    /// Entries evicted from the indicator cache
    pub cache_evictions_total: Counter,
    /// Wall time of one indicator set computation
    pub indicator_compute_seconds: Histogram,
    /// Indicator series computed by kind
    pub indicators_computed_total: CounterVec,
    /// Workers currently running a task
    pub pool_active_workers: GenericGauge<AtomicF64>,
    /// Tasks waiting in the pool queue
    pub pool_queue_depth: GenericGauge<AtomicF64>,
    /// Pool task outcomes (completed/failed/timed_out/aborted)
    pub pool_tasks_total: CounterVec,
    /// Aggregated buckets closed by interval
    pub buckets_closed_total: CounterVec,
    /// Base candles skipped by the aggregator, by reason
    pub candles_skipped_total: CounterVec,
    /// Close listener failures (error or panic) by listener name
    pub listener_failures_total: CounterVec,
    /// Batch instrument outcomes (ok/error)
    pub batch_instruments_total: CounterVec,
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("series", &self.registry.gather().len())
            .field(
                "indicator_sets_computed",
                &self.indicator_compute_seconds.get_sample_count(),
            )
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "ohlcflow_uptime_seconds",
            "Engine uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let cache_requests_total = CounterVec::new(
            Opts::new(
                "ohlcflow_cache_requests_total",
                "Indicator cache lookups by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(cache_requests_total.clone()))?;

        let cache_entries = Gauge::with_opts(Opts::new(
            "ohlcflow_cache_entries",
            "Entries currently held by the indicator cache",
        ))?;
        registry.register(Box::new(cache_entries.clone()))?;

        let cache_evictions_total = Counter::with_opts(Opts::new(
            "ohlcflow_cache_evictions_total",
            "Entries evicted from the indicator cache",
        ))?;
        registry.register(Box::new(cache_evictions_total.clone()))?;

        let indicator_compute_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "ohlcflow_indicator_compute_seconds",
                "Indicator set computation time in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0,
            ]),
        )?;
        registry.register(Box::new(indicator_compute_seconds.clone()))?;

        let indicators_computed_total = CounterVec::new(
            Opts::new(
                "ohlcflow_indicators_computed_total",
                "Indicator series computed by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(indicators_computed_total.clone()))?;

        let pool_active_workers = Gauge::with_opts(Opts::new(
            "ohlcflow_pool_active_workers",
            "Workers currently running a task",
        ))?;
        registry.register(Box::new(pool_active_workers.clone()))?;

        let pool_queue_depth = Gauge::with_opts(Opts::new(
            "ohlcflow_pool_queue_depth",
            "Tasks waiting in the worker pool queue",
        ))?;
        registry.register(Box::new(pool_queue_depth.clone()))?;

        let pool_tasks_total = CounterVec::new(
            Opts::new("ohlcflow_pool_tasks_total", "Worker pool task outcomes"),
            &["outcome"],
        )?;
        registry.register(Box::new(pool_tasks_total.clone()))?;

        let buckets_closed_total = CounterVec::new(
            Opts::new(
                "ohlcflow_buckets_closed_total",
                "Aggregated buckets closed by interval",
            ),
            &["interval"],
        )?;
        registry.register(Box::new(buckets_closed_total.clone()))?;

        let candles_skipped_total = CounterVec::new(
            Opts::new(
                "ohlcflow_candles_skipped_total",
                "Base candles skipped by the aggregator",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(candles_skipped_total.clone()))?;

        let listener_failures_total = CounterVec::new(
            Opts::new(
                "ohlcflow_listener_failures_total",
                "Close listener failures by listener",
            ),
            &["listener"],
        )?;
        registry.register(Box::new(listener_failures_total.clone()))?;

        let batch_instruments_total = CounterVec::new(
            Opts::new(
                "ohlcflow_batch_instruments_total",
                "Batch instrument results by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(batch_instruments_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            uptime_seconds,
            cache_requests_total,
            cache_entries,
            cache_evictions_total,
            indicator_compute_seconds,
            indicators_computed_total,
            pool_active_workers,
            pool_queue_depth,
            pool_tasks_total,
            buckets_closed_total,
            candles_skipped_total,
            listener_failures_total,
            batch_instruments_total,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_cache(&self, outcome: &str) {
        self.cache_requests_total.with_label_values(&[outcome]).inc();
    }

    /// Record one computed series
    pub fn inc_indicator(&self, kind: &str) {
        self.indicators_computed_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_pool_task(&self, outcome: &str) {
        self.pool_tasks_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_buckets_closed(&self, interval: &str, count: usize) {
        self.buckets_closed_total
            .with_label_values(&[interval])
            .inc_by(count as f64);
    }

    pub fn inc_skipped(&self, reason: &str, count: usize) {
        if count > 0 {
            self.candles_skipped_total
                .with_label_values(&[reason])
                .inc_by(count as f64);
        }
    }

    pub fn inc_listener_failure(&self, listener: &str) {
        self.listener_failures_total
            .with_label_values(&[listener])
            .inc();
    }

    pub fn inc_batch_instrument(&self, outcome: &str) {
        self.batch_instruments_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Mean indicator computation time in milliseconds, 0 before the first sample
    pub fn average_compute_ms(&self) -> f64 {
        let count = self.indicator_compute_seconds.get_sample_count();
        if count == 0 {
            return 0.0;
        }
        self.indicator_compute_seconds.get_sample_sum() / count as f64 * 1000.0
    }

    /// Current value of a labelled counter, 0 if never incremented
    pub fn counter_value(counter: &CounterVec, label: &str) -> f64 {
        counter.with_label_values(&[label]).get()
    }
}
