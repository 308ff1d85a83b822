use crate::domain::market::events::{BucketCloseEvent, CloseListener};
use crate::infrastructure::observability::Metrics;
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Outcome of one publish: how many listeners returned Ok, and which failed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: Vec<String>,
}

impl NotifyReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registry of close listeners.
///
/// Listeners run in registration order on the publishing task. A listener
/// that errors or panics is logged and skipped; the rest still run.
pub struct CloseEventBus {
    listeners: Arc<RwLock<Vec<Arc<dyn CloseListener>>>>,
    metrics: Option<Metrics>,
}

impl CloseEventBus {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribe a listener to bucket closes
    pub async fn subscribe(&self, listener: Arc<dyn CloseListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Invoke every listener once with `event`
    pub async fn publish(&self, event: &BucketCloseEvent) -> NotifyReport {
        let listeners = self.listeners.read().await;
        let mut report = NotifyReport::default();

        for listener in listeners.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_close(event)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };

            match failure {
                None => report.delivered += 1,
                Some(reason) => {
                    warn!(
                        "CloseEventBus: Listener '{}' failed on {} @ {}: {}",
                        listener.name(),
                        event.interval,
                        event.timestamp,
                        reason
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_listener_failure(listener.name());
                    }
                    report.failed.push(listener.name().to_string());
                }
            }
        }
        report
    }

    /// Get count of subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.listeners.read().await.len()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

impl Default for CloseEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CloseEventBus {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            metrics: self.metrics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::candle::AggregatedCandle;
    use crate::domain::market::events::{FnCloseListener, LoggingCloseListener};
    use crate::domain::market::interval::Interval;
    use anyhow::anyhow;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        count: Arc<AtomicUsize>,
    }

    impl CloseListener for CountingListener {
        fn on_close(&self, _event: &BucketCloseEvent) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(timestamp: i64) -> BucketCloseEvent {
        BucketCloseEvent::single(AggregatedCandle {
            symbol: "NIFTY".to_string(),
            source_interval: Interval::ONE_MIN,
            interval: Interval::FIVE_MIN,
            timestamp,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10,
            open_interest: None,
            candle_count: 5,
            bb_width: None,
            baseline_bb_width: None,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscribe() {
        let bus = CloseEventBus::new();
        assert_eq!(bus.subscriber_count().await, 0);

        bus.subscribe(Arc::new(LoggingCloseListener)).await;
        bus.subscribe(Arc::new(LoggingCloseListener)).await;
        assert_eq!(bus.subscriber_count().await, 2);
    }

    #[tokio::test]
    async fn test_registration_order() {
        let bus = CloseEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.subscribe(Arc::new(FnCloseListener::new(name, move |_| {
                seen.lock().unwrap().push(name);
                Ok(())
            })))
            .await;
        }

        let report = bus.publish(&event(0)).await;
        assert_eq!(report.delivered, 3);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let metrics = Metrics::new().unwrap();
        let bus = CloseEventBus::new().with_metrics(metrics.clone());
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(Arc::new(FnCloseListener::new("erroring", |_| {
            Err(anyhow!("downstream unavailable"))
        })))
        .await;
        bus.subscribe(Arc::new(FnCloseListener::new(
            "panicking",
            |_: &BucketCloseEvent| -> anyhow::Result<()> { panic!("listener bug") },
        )))
        .await;
        bus.subscribe(Arc::new(CountingListener {
            count: Arc::clone(&count),
        }))
        .await;

        let report = bus.publish(&event(0)).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec!["erroring", "panicking"]);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // registry still intact
        assert_eq!(bus.subscriber_count().await, 3);
        bus.publish(&event(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(
            Metrics::counter_value(&metrics.listener_failures_total, "panicking"),
            2.0
        );
    }

    #[tokio::test]
    async fn test_event_bus_clone() {
        let bus1 = CloseEventBus::new();
        let bus2 = bus1.clone();

        bus1.subscribe(Arc::new(LoggingCloseListener)).await;

        // Clone should share the same listeners
        assert_eq!(bus2.subscriber_count().await, 1);
    }
}
