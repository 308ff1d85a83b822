//! Concurrent indicator computation.
//!
//! A bounded [`WorkerPool`] runs tasks under a per-task timeout; the
//! [`BatchCoordinator`] fans multi-instrument requests out over it.

pub mod batch;
pub mod cancellation;
pub mod worker_pool;

pub use batch::{BatchCoordinator, BatchResult, ComputationRequest};
pub use cancellation::{CancelSignal, CancellationHandle, cancellation};
pub use worker_pool::{PoolConfig, PoolStats, ShutdownReport, TaskHandle, WorkerPool};
