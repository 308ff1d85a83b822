use crate::application::indicators::{IndicatorCalculator, IndicatorRequest, IndicatorService};
use crate::application::market_data::aggregation_service::AggregationService;
use crate::application::market_data::bucket_aggregator::BucketAggregator;
use crate::application::market_data::indicator_cache::{CacheStats, IndicatorCache};
use crate::application::market_data::live_aggregator::LiveAggregator;
use crate::application::pipeline::batch::{BatchCoordinator, BatchResult, ComputationRequest};
use crate::application::pipeline::cancellation::CancelSignal;
use crate::application::pipeline::worker_pool::{PoolStats, ShutdownReport, WorkerPool};
use crate::config::Config;
use crate::domain::errors::{DataError, EngineError, IndicatorError};
use crate::domain::indicators::{
    IndicatorKind, IndicatorParams, IndicatorSet, IndicatorSpec, IndicatorValue,
};
use crate::domain::market::candle::{AggregatedCandle, Candle};
use crate::domain::market::events::CloseListener;
use crate::domain::market::interval::Interval;
use crate::domain::market::session::TradingSession;
use crate::domain::ports::{BandWidthBaseline, CandleSource};
use crate::infrastructure::event_bus::CloseEventBus;
use crate::infrastructure::observability::{Metrics, MetricsReporter};
use anyhow::{Result, anyhow};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Point-in-time view of the engine's shared resources
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub cache: Option<CacheStats>,
    pub pool: PoolStats,
    pub average_compute_ms: f64,
    pub listeners: usize,
}

/// Wires the aggregator, indicator library, cache, worker pool and
/// listener registry behind one handle.
pub struct Engine {
    config: Config,
    session: Arc<TradingSession>,
    metrics: Metrics,
    bus: CloseEventBus,
    cache: Option<Arc<IndicatorCache>>,
    aggregation: Arc<AggregationService>,
    service: Arc<IndicatorService>,
    batch: BatchCoordinator,
    baseline: Option<Arc<dyn BandWidthBaseline>>,
}

impl Engine {
    /// Builds the engine over `source`. Spawns the worker pool, so it must
    /// run inside a Tokio runtime.
    pub async fn build(config: Config, source: Arc<dyn CandleSource>) -> Result<Self> {
        Self::build_with_baseline(config, source, None).await
    }

    pub async fn build_with_baseline(
        config: Config,
        source: Arc<dyn CandleSource>,
        baseline: Option<Arc<dyn BandWidthBaseline>>,
    ) -> Result<Self> {
        info!(
            "Building ohlcflow Engine (interval: {}, base: {}, strategy: {})...",
            config.indicators.interval, config.indicators.base_interval, config.indicators.strategy
        );

        // 1. Shared state
        let metrics = Metrics::new()?;
        let session = Arc::new(config.session.to_session()?);
        let bus = CloseEventBus::new().with_metrics(metrics.clone());
        if config
            .indicators
            .interval
            .base_candles_per_bucket(config.indicators.base_interval)
            .is_none()
        {
            return Err(anyhow!(DataError::IncompatibleInterval {
                requested: config.indicators.interval.to_string(),
                base: config.indicators.base_interval.to_string(),
            }));
        }

        // 2. Aggregation
        let aggregator = BucketAggregator::new(session.clone(), config.indicators.base_interval)
            .with_metrics(metrics.clone());
        let mut aggregation =
            AggregationService::new(source, aggregator, config.indicators.interval)
                .with_bands(config.indicators.bands)
                .with_bus(bus.clone())
                .with_metrics(metrics.clone());
        if let Some(baseline) = &baseline {
            aggregation = aggregation.with_baseline(baseline.clone());
        }
        let aggregation = Arc::new(aggregation);

        // 3. Indicators and cache
        let cache = if config.cache.enabled {
            info!(
                "Indicator cache enabled ({} entries, {} bytes)",
                config.cache.max_entries, config.cache.max_bytes
            );
            Some(Arc::new(
                IndicatorCache::new(config.cache.max_entries, config.cache.max_bytes)
                    .with_metrics(metrics.clone()),
            ))
        } else {
            info!("Indicator cache disabled");
            None
        };
        let mut service = IndicatorService::new(
            aggregation.clone(),
            IndicatorCalculator::new(config.indicators.strategy),
        )
        .with_metrics(metrics.clone());
        if let Some(cache) = &cache {
            service = service.with_cache(cache.clone());
        }
        let service = Arc::new(service);

        // 4. Pipeline
        let pool = Arc::new(WorkerPool::with_metrics(
            config.pipeline.to_pool_config(),
            metrics.clone(),
        ));
        let batch = BatchCoordinator::new(pool, service.clone()).with_metrics(metrics.clone());

        Ok(Self {
            config,
            session,
            metrics,
            bus,
            cache,
            aggregation,
            service,
            batch,
            baseline,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn session(&self) -> &Arc<TradingSession> {
        &self.session
    }

    pub fn bus(&self) -> &CloseEventBus {
        &self.bus
    }

    /// Aggregated candles for `[start, end]` at the configured interval
    pub async fn aggregate(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        cancel: &CancelSignal,
    ) -> Result<Vec<AggregatedCandle>, EngineError> {
        self.aggregation.aggregate(symbol, start, end, cancel).await
    }

    /// Aggregated candles for `[start, end]` at an explicit interval
    pub async fn aggregate_into(
        &self,
        symbol: &str,
        interval: Interval,
        start: i64,
        end: i64,
        cancel: &CancelSignal,
    ) -> Result<Vec<AggregatedCandle>, EngineError> {
        self.aggregation
            .aggregate_into(symbol, interval, start, end, false, cancel)
            .await
    }

    /// Bucket-by-bucket replay; every bucket also reaches the registered listeners.
    pub async fn aggregate_streaming<F>(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        on_close: F,
        cancel: &CancelSignal,
    ) -> Result<usize, EngineError>
    where
        F: FnMut(&AggregatedCandle) + Send,
    {
        self.aggregation
            .aggregate_streaming(symbol, start, end, on_close, cancel)
            .await
    }

    /// One indicator over caller-supplied candles. Pure, uncached.
    pub fn calculate_indicator(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        params: IndicatorParams,
        candles: &[Candle],
    ) -> Result<Vec<IndicatorValue>, IndicatorError> {
        self.service
            .calculator()
            .calculate(symbol, kind, params, candles)
    }

    /// Several indicators over caller-supplied candles. Pure, uncached.
    pub fn calculate_indicator_set(
        &self,
        symbol: &str,
        interval: Interval,
        specs: &[IndicatorSpec],
        candles: &[Candle],
    ) -> Result<IndicatorSet, IndicatorError> {
        self.service
            .calculator()
            .calculate_indicator_set(symbol, interval, specs, candles)
    }

    /// Source-backed indicators for one instrument, through the cache
    pub async fn compute(
        &self,
        request: &IndicatorRequest,
        cancel: &CancelSignal,
    ) -> Result<IndicatorSet, EngineError> {
        self.service.compute(request, cancel).await
    }

    /// Source-backed indicators for many instruments, through the worker pool
    pub async fn calculate_batch(
        &self,
        request: ComputationRequest,
        cancel: &CancelSignal,
    ) -> Result<BatchResult, EngineError> {
        self.batch.run(request, cancel).await
    }

    pub async fn register_close_listener(&self, listener: Arc<dyn CloseListener>) {
        info!("Engine: Registering close listener '{}'", listener.name());
        self.bus.subscribe(listener).await;
    }

    /// Live multi-instrument aggregator publishing to this engine's listeners
    pub fn live_aggregator(&self) -> Result<LiveAggregator, DataError> {
        let mut live = LiveAggregator::new(
            self.config.indicators.interval,
            self.config.indicators.base_interval,
            self.session.clone(),
            self.bus.clone(),
        )?
        .with_bands(self.config.indicators.bands)
        .with_metrics(self.metrics.clone());
        if let Some(baseline) = &self.baseline {
            live = live.with_baseline(baseline.clone());
        }
        Ok(live)
    }

    /// Push reporter over this engine's cache and pool
    pub fn reporter(&self) -> MetricsReporter {
        let mut reporter = MetricsReporter::new(
            self.metrics.clone(),
            self.config.observability.report_interval_secs,
        )
        .with_pool(self.batch.pool().clone());
        if let Some(cache) = &self.cache {
            reporter = reporter.with_cache(cache.clone());
        }
        reporter
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            cache: self.cache.as_ref().map(|c| c.stats()),
            pool: self.batch.pool().stats(),
            average_compute_ms: self.metrics.average_compute_ms(),
            listeners: self.bus.subscriber_count().await,
        }
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Stops the worker pool within the configured grace period
    pub async fn shutdown(&self) -> ShutdownReport {
        info!("Engine: Shutting down...");
        self.batch.pool().shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::events::FnCloseListener;
    use crate::infrastructure::mock::SyntheticCandleSource;
    use chrono::{FixedOffset, TimeZone};
    use std::sync::Mutex;

    fn ist(h: u32, m: u32) -> i64 {
        FixedOffset::east_opt(19_800)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, h, m, 0)
            .unwrap()
            .timestamp_millis()
    }

    async fn engine(config: Config) -> Engine {
        let source = SyntheticCandleSource::new(Arc::new(TradingSession::default()), 42);
        Engine::build(config, Arc::new(source)).await.unwrap()
    }

    #[tokio::test]
    async fn test_aggregate_and_compute() {
        let engine = engine(Config::default()).await;
        let buckets = engine
            .aggregate("NIFTY", ist(9, 15), ist(10, 14), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(buckets.len(), 12);

        let request = IndicatorRequest {
            symbol: "NIFTY".to_string(),
            interval: Interval::FIVE_MIN,
            start: ist(9, 15),
            end: ist(10, 14),
            specs: engine.config().indicators.default_indicators.clone(),
        };
        let first = engine.compute(&request, &CancelSignal::never()).await.unwrap();
        let second = engine.compute(&request, &CancelSignal::never()).await.unwrap();
        assert_eq!(first, second);

        let stats = engine.stats().await;
        assert!(stats.cache.unwrap().hits >= 6);
        engine.clear_cache();
        assert_eq!(engine.stats().await.cache.unwrap().entries, 0);
        assert!(engine.shutdown().await.clean);
    }

    #[tokio::test]
    async fn test_streaming_reaches_listeners() {
        let engine = engine(Config::default()).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine
            .register_close_listener(Arc::new(FnCloseListener::new("sink", move |e| {
                sink.lock().unwrap().push(e.timestamp);
                Ok(())
            })))
            .await;

        let emitted = engine
            .aggregate_streaming("NIFTY", ist(9, 15), ist(9, 29), |_| {}, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(emitted, 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ist(9, 15), ist(9, 20), ist(9, 25)]
        );
        assert_eq!(engine.stats().await.listeners, 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_gives_same_values() {
        let mut config = Config::default();
        config.cache.enabled = false;
        let uncached = engine(config).await;
        let cached = engine(Config::default()).await;

        let request = IndicatorRequest {
            symbol: "BANKNIFTY".to_string(),
            interval: Interval::FIFTEEN_MIN,
            start: ist(9, 15),
            end: ist(15, 30),
            specs: vec![IndicatorSpec::parse("bb_width:5:2").unwrap()],
        };
        let a = uncached.compute(&request, &CancelSignal::never()).await.unwrap();
        let b = cached.compute(&request, &CancelSignal::never()).await.unwrap();
        let c = cached.compute(&request, &CancelSignal::never()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(uncached.stats().await.cache.is_none());
    }

    #[tokio::test]
    async fn test_pure_calculation_rejects_bad_period() {
        let engine = engine(Config::default()).await;
        let err = engine
            .calculate_indicator("X", IndicatorKind::Sma, IndicatorParams::period(0), &[])
            .unwrap_err();
        assert!(matches!(err, IndicatorError::InvalidPeriod { .. }));
    }
}
