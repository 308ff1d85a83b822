use super::cancellation::CancelSignal;
use super::worker_pool::{TaskHandle, WorkerPool};
use crate::application::indicators::service::{IndicatorRequest, IndicatorService};
use crate::domain::errors::EngineError;
use crate::domain::indicators::{IndicatorSet, IndicatorSpec};
use crate::domain::market::interval::Interval;
use crate::domain::market::universe::InstrumentSelection;
use crate::infrastructure::observability::Metrics;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Same indicator set over the same range for many instruments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationRequest {
    pub id: Uuid,
    pub instruments: InstrumentSelection,
    pub interval: Interval,
    pub start: i64,
    pub end: i64,
    pub indicators: Vec<IndicatorSpec>,
}

impl ComputationRequest {
    pub fn new(
        instruments: impl Into<InstrumentSelection>,
        interval: Interval,
        start: i64,
        end: i64,
        indicators: Vec<IndicatorSpec>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instruments: instruments.into(),
            interval,
            start,
            end,
            indicators,
        }
    }
}

/// One entry per requested instrument, success or failure.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub request_id: Uuid,
    pub results: HashMap<String, Result<IndicatorSet, EngineError>>,
    pub elapsed_ms: u64,
}

impl BatchResult {
    pub fn get(&self, symbol: &str) -> Option<&Result<IndicatorSet, EngineError>> {
        self.results.get(symbol)
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.values().filter(|r| r.is_err()).count()
    }
}

/// Fans a [`ComputationRequest`] out over the worker pool, one task per
/// instrument, and gathers the outcomes.
pub struct BatchCoordinator {
    pool: Arc<WorkerPool>,
    service: Arc<IndicatorService>,
    metrics: Option<Metrics>,
}

impl BatchCoordinator {
    pub fn new(pool: Arc<WorkerPool>, service: Arc<IndicatorService>) -> Self {
        Self {
            pool,
            service,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Runs the batch. Per-instrument failures (source errors, timeouts, a
    /// full or closed pool) land in that instrument's slot. Cancellation
    /// discards everything and returns `Cancelled`.
    pub async fn run(
        &self,
        request: ComputationRequest,
        cancel: &CancelSignal,
    ) -> Result<BatchResult, EngineError> {
        cancel.check()?;
        let started = Instant::now();
        let instruments = request.instruments.clone().into_filtered();
        info!(
            "BatchCoordinator: Request {} for {} instruments, {} indicators at {}",
            request.id,
            instruments.len(),
            request.indicators.len(),
            request.interval
        );

        let mut results: HashMap<String, Result<IndicatorSet, EngineError>> =
            HashMap::with_capacity(instruments.len());
        let mut handles: Vec<(String, TaskHandle<Result<IndicatorSet, EngineError>>)> =
            Vec::with_capacity(instruments.len());

        for symbol in instruments.iter() {
            let service = Arc::clone(&self.service);
            let task_cancel = cancel.clone();
            let indicator_request = IndicatorRequest {
                symbol: symbol.clone(),
                interval: request.interval,
                start: request.start,
                end: request.end,
                specs: request.indicators.clone(),
            };
            let task = async move { service.compute(&indicator_request, &task_cancel).await };

            let submitted = tokio::select! {
                submitted = self.pool.submit(format!("{}:{}", request.id, symbol), task) => submitted,
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            };
            match submitted {
                Ok(handle) => handles.push((symbol.clone(), handle)),
                Err(e) => {
                    warn!("BatchCoordinator: Could not schedule {}: {}", symbol, e);
                    results.insert(symbol.clone(), Err(e.into()));
                }
            }
        }

        let joined = tokio::select! {
            joined = join_all(
                handles
                    .into_iter()
                    .map(|(symbol, handle)| async move { (symbol, handle.join().await) }),
            ) => joined,
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
        };

        for (symbol, outcome) in joined {
            let result = outcome.unwrap_or_else(|e| Err(e.into()));
            if let Err(e) = &result {
                warn!("BatchCoordinator: {} failed: {}", symbol, e);
            }
            results.insert(symbol, result);
        }
        cancel.check()?;

        let batch = BatchResult {
            request_id: request.id,
            results,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        if let Some(metrics) = &self.metrics {
            for result in batch.results.values() {
                metrics.inc_batch_instrument(if result.is_ok() { "ok" } else { "error" });
            }
        }
        info!(
            "BatchCoordinator: Request {} done in {}ms ({} ok, {} failed)",
            batch.request_id,
            batch.elapsed_ms,
            batch.succeeded(),
            batch.failed()
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::indicators::IndicatorCalculator;
    use crate::application::market_data::aggregation_service::AggregationService;
    use crate::application::market_data::bucket_aggregator::BucketAggregator;
    use crate::application::pipeline::cancellation::cancellation;
    use crate::application::pipeline::worker_pool::PoolConfig;
    use crate::domain::errors::{DataError, PipelineError};
    use crate::domain::market::candle::Candle;
    use crate::domain::market::session::TradingSession;
    use crate::domain::ports::CandleSource;
    use crate::domain::repositories::CandleRepository;
    use crate::infrastructure::repositories::InMemoryCandleRepository;
    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone};
    use std::time::Duration;

    /// Fails for `BROKEN`, stalls for `SLOW`, serves the rest from memory.
    struct FlakySource {
        inner: InMemoryCandleRepository,
    }

    #[async_trait]
    impl CandleSource for FlakySource {
        async fn fetch_candles(
            &self,
            symbol: &str,
            interval: Interval,
            start: i64,
            end: i64,
        ) -> anyhow::Result<Vec<Candle>> {
            match symbol {
                "BROKEN" => anyhow::bail!("connection reset"),
                "SLOW" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Vec::new())
                }
                _ => self.inner.fetch_candles(symbol, interval, start, end).await,
            }
        }
    }

    fn ist(h: u32, m: u32) -> i64 {
        FixedOffset::east_opt(19_800)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, h, m, 0)
            .unwrap()
            .timestamp_millis()
    }

    async fn coordinator(config: PoolConfig) -> BatchCoordinator {
        let inner = InMemoryCandleRepository::new();
        for (n, symbol) in ["INFY", "TCS", "WIPRO"].iter().enumerate() {
            let candles: Vec<Candle> = (0..60)
                .map(|m| {
                    let price = 100.0 * (n + 1) as f64 + (m as f64 * 0.4).cos() * 3.0;
                    Candle {
                        symbol: symbol.to_string(),
                        interval: Interval::ONE_MIN,
                        timestamp: ist(9, 15) + m * 60_000,
                        open: price,
                        high: price + 0.5,
                        low: price - 0.5,
                        close: price,
                        volume: 1_000,
                        open_interest: None,
                    }
                })
                .collect();
            inner.store(&candles).await.unwrap();
        }
        let aggregator =
            BucketAggregator::new(Arc::new(TradingSession::default()), Interval::ONE_MIN);
        let aggregation = Arc::new(AggregationService::new(
            Arc::new(FlakySource { inner }),
            aggregator,
            Interval::FIVE_MIN,
        ));
        let service = Arc::new(IndicatorService::new(
            aggregation,
            IndicatorCalculator::default(),
        ));
        BatchCoordinator::new(Arc::new(WorkerPool::new(config)), service)
    }

    fn request(symbols: Vec<&str>) -> ComputationRequest {
        ComputationRequest::new(
            symbols,
            Interval::FIVE_MIN,
            ist(9, 15),
            ist(10, 14),
            vec![
                IndicatorSpec::parse("sma:3").unwrap(),
                IndicatorSpec::parse("atr:3").unwrap(),
            ],
        )
    }

    #[tokio::test]
    async fn test_failing_instrument_is_isolated() {
        let batch = coordinator(PoolConfig::default()).await;
        let result = batch
            .run(request(vec!["INFY", "BROKEN", "TCS", "INFY"]), &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(result.results.len(), 3);
        assert_eq!(result.succeeded(), 2);
        let infy = result.get("INFY").unwrap().as_ref().unwrap();
        assert_eq!(infy.len(), 2);
        assert_eq!(
            infy.get(&IndicatorSpec::parse("sma:3").unwrap()).unwrap().len(),
            12
        );
        assert!(matches!(
            result.get("BROKEN"),
            Some(Err(EngineError::Data(DataError::Source { .. })))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_only_fails_that_instrument() {
        let batch = coordinator(PoolConfig {
            max_workers: 2,
            task_timeout: Duration::from_secs(5),
            ..PoolConfig::default()
        })
        .await;
        let result = batch
            .run(request(vec!["SLOW", "WIPRO", "TCS"]), &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(result.results.len(), 3);
        assert!(result.get("WIPRO").unwrap().is_ok());
        assert!(result.get("TCS").unwrap().is_ok());
        assert!(matches!(
            result.get("SLOW"),
            Some(Err(EngineError::Pipeline(PipelineError::TaskTimeout { .. })))
        ));
    }

    #[tokio::test]
    async fn test_shut_down_pool_fills_every_slot() {
        let batch = coordinator(PoolConfig::default()).await;
        batch.pool().shutdown().await;

        let result = batch
            .run(request(vec!["INFY", "TCS"]), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(result.failed(), 2);
        assert!(
            result
                .results
                .values()
                .all(|r| matches!(r, Err(e) if e.is_retryable()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_discards_batch() {
        let batch = coordinator(PoolConfig::default()).await;
        let (handle, signal) = cancellation();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.cancel();
        });

        let err = batch
            .run(request(vec!["SLOW", "INFY"]), &signal)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }

    #[tokio::test]
    async fn test_empty_universe() {
        let batch = coordinator(PoolConfig::default()).await;
        let result = batch
            .run(request(vec![" ", ""]), &CancelSignal::never())
            .await
            .unwrap();
        assert!(result.results.is_empty());
    }
}
