//! Push-based observability for ohlcflow
//!
//! This module provides observability through **outbound data only** - no HTTP server,
//! no incoming requests. Prometheus metrics are kept in-process and pushed as
//! periodic JSON snapshots to stdout (for Loki, Fluentd, CloudWatch).
//!
//! **Security**: This system only SENDS data, it never accepts requests.

pub mod latency_tracker;
pub mod metrics;
pub mod reporter;

pub use latency_tracker::LatencyGuard;
pub use metrics::Metrics;
pub use reporter::{MetricsReporter, MetricsSnapshot};
