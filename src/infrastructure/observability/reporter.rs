//! Push-based metrics reporter for ohlcflow
//!
//! Periodically outputs engine statistics as structured JSON to stdout.
//!
//! **Security**: This system only SENDS data, never accepts requests.

use crate::application::market_data::indicator_cache::{CacheStats, IndicatorCache};
use crate::application::pipeline::cancellation::CancelSignal;
use crate::application::pipeline::worker_pool::{PoolStats, WorkerPool};
use crate::infrastructure::observability::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Metrics snapshot for JSON output
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub cache: Option<CacheStats>,
    pub pool: Option<PoolStats>,
    pub compute: ComputeSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ComputeSnapshot {
    pub indicator_sets_computed: u64,
    pub average_compute_ms: f64,
}

/// Push-based metrics reporter
///
/// Outputs metrics as structured JSON logs on a configurable interval.
/// No HTTP server, no incoming connections - only outbound data.
pub struct MetricsReporter {
    metrics: Metrics,
    cache: Option<Arc<IndicatorCache>>,
    pool: Option<Arc<WorkerPool>>,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            metrics,
            cache: None,
            pool: None,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    pub fn with_cache(mut self, cache: Arc<IndicatorCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Outputs a snapshot every interval until `cancel` fires, then a final one.
    pub async fn run(self, cancel: CancelSignal) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            self.interval
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => self.emit(),
                _ = cancel.cancelled() => {
                    self.emit();
                    info!("MetricsReporter: Stopped");
                    return;
                }
            }
        }
    }

    fn emit(&self) {
        let snapshot = self.collect_snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                // Use a special prefix so logs can be easily filtered
                println!("METRICS_JSON:{}", json);
                info!(
                    "Cache hit rate: {:.1}% | Pool utilization: {:.1}% | Avg compute: {:.2}ms | Uptime: {}s",
                    snapshot.cache.as_ref().map_or(0.0, |c| c.hit_rate * 100.0),
                    snapshot.pool.as_ref().map_or(0.0, |p| p.utilization * 100.0),
                    snapshot.compute.average_compute_ms,
                    snapshot.uptime_seconds
                );
            }
            Err(e) => warn!("Failed to serialize metrics: {}", e),
        }
    }

    /// Collect current metrics snapshot and refresh the gauges it covers
    pub fn collect_snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let cache = self.cache.as_ref().map(|c| c.stats());
        let pool = self.pool.as_ref().map(|p| p.stats());

        self.metrics.uptime_seconds.set(uptime as f64);
        if let Some(cache) = &cache {
            self.metrics.cache_entries.set(cache.entries as f64);
        }
        if let Some(pool) = &pool {
            self.metrics.pool_active_workers.set(pool.active as f64);
            self.metrics.pool_queue_depth.set(pool.queued as f64);
        }

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            cache,
            pool,
            compute: ComputeSnapshot {
                indicator_sets_computed: self.metrics.indicator_compute_seconds.get_sample_count(),
                average_compute_ms: self.metrics.average_compute_ms(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::worker_pool::PoolConfig;

    #[tokio::test]
    async fn test_metrics_snapshot_collection() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        let cache = Arc::new(IndicatorCache::new(10, 1024));
        let pool = Arc::new(WorkerPool::new(PoolConfig::default()));
        let reporter = MetricsReporter::new(metrics.clone(), 60)
            .with_cache(cache)
            .with_pool(pool.clone());

        let snapshot = reporter.collect_snapshot();
        assert_eq!(snapshot.cache.as_ref().unwrap().entries, 0);
        assert_eq!(snapshot.pool.as_ref().unwrap().max_workers, 4);
        assert_eq!(snapshot.compute.indicator_sets_computed, 0);
        assert!(!snapshot.timestamp.is_empty());
        pool.shutdown().await;
    }

    #[test]
    fn test_snapshot_serialization() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.indicator_compute_seconds.observe(0.004);
        let reporter = MetricsReporter::new(metrics, 60);

        let json = serde_json::to_string(&reporter.collect_snapshot()).expect("Failed to serialize");
        assert!(json.contains("\"cache\":null"));
        assert!(json.contains("\"indicator_sets_computed\":1"));
        assert!(json.contains("average_compute_ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        let reporter = MetricsReporter::new(metrics, 1);
        let (handle, signal) = crate::application::pipeline::cancellation::cancellation();

        let task = tokio::spawn(reporter.run(signal));
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        handle.cancel();
        tokio_test::assert_ok!(task.await);
    }
}
