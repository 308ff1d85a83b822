use super::IndicatorCalculator;
use crate::application::market_data::aggregation_service::AggregationService;
use crate::application::market_data::indicator_cache::{Fingerprint, IndicatorCache};
use crate::application::pipeline::cancellation::CancelSignal;
use crate::domain::errors::{EngineError, IndicatorError};
use crate::domain::indicators::{IndicatorSet, IndicatorSpec};
use crate::domain::market::candle::Candle;
use crate::domain::market::interval::Interval;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::observability::latency_tracker::LatencyGuard;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Indicators wanted for one instrument over `[start, end]` at `interval`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start: i64,
    pub end: i64,
    pub specs: Vec<IndicatorSpec>,
}

/// Source-backed indicator computation with optional memoization.
///
/// Cached series are served without touching the candle source; only the
/// missing ones trigger a fetch.
pub struct IndicatorService {
    aggregation: Arc<AggregationService>,
    calculator: IndicatorCalculator,
    cache: Option<Arc<IndicatorCache>>,
    metrics: Option<Metrics>,
}

impl IndicatorService {
    pub fn new(aggregation: Arc<AggregationService>, calculator: IndicatorCalculator) -> Self {
        Self {
            aggregation,
            calculator,
            cache: None,
            metrics: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<IndicatorCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn calculator(&self) -> &IndicatorCalculator {
        &self.calculator
    }

    pub fn cache(&self) -> Option<&Arc<IndicatorCache>> {
        self.cache.as_ref()
    }

    pub async fn compute(
        &self,
        request: &IndicatorRequest,
        cancel: &CancelSignal,
    ) -> Result<IndicatorSet, EngineError> {
        cancel.check()?;
        let symbol = request.symbol.as_str();
        let strategy = self.calculator.strategy();
        let mut set = IndicatorSet::new(symbol, request.interval);
        let mut missing: Vec<(IndicatorSpec, Option<Fingerprint>)> = Vec::new();

        for spec in &request.specs {
            let Some(cache) = &self.cache else {
                missing.push((*spec, None));
                continue;
            };
            let fingerprint = Fingerprint::new(
                symbol,
                spec,
                request.interval,
                request.start,
                request.end,
                strategy,
            );
            match cache.get(&fingerprint) {
                Some(values) => set.insert(spec, values.as_ref().clone()),
                None => missing.push((*spec, Some(fingerprint))),
            }
        }

        if missing.is_empty() {
            debug!(
                "IndicatorService: {} served entirely from cache ({} series)",
                symbol,
                set.len()
            );
            return Ok(set);
        }

        let buckets = self
            .aggregation
            .aggregate_into(
                symbol,
                request.interval,
                request.start,
                request.end,
                false,
                cancel,
            )
            .await?;
        let candles: Vec<Candle> = buckets.iter().map(|b| b.to_candle()).collect();
        if candles.is_empty() {
            return Err(IndicatorError::EmptySeries {
                symbol: symbol.to_string(),
            }
            .into());
        }

        let specs: Vec<IndicatorSpec> = missing.iter().map(|(spec, _)| *spec).collect();
        let computed = {
            let _latency =
                LatencyGuard::maybe(self.metrics.as_ref().map(|m| &m.indicator_compute_seconds));
            self.calculator
                .calculate_indicator_set(symbol, request.interval, &specs, &candles)?
        };

        for (spec, fingerprint) in missing {
            let values = computed.get(&spec).map(<[_]>::to_vec).unwrap_or_default();
            if let (Some(cache), Some(fingerprint)) = (&self.cache, fingerprint) {
                cache.put(fingerprint, values.clone());
            }
            if let Some(metrics) = &self.metrics {
                metrics.inc_indicator(spec.kind().as_str());
            }
            set.insert(&spec, values);
        }

        cancel.check()?;
        Ok(set)
    }
}
