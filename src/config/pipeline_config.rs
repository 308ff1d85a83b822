//! Worker pool configuration parsing from environment variables.

use crate::application::pipeline::worker_pool::PoolConfig;
use anyhow::{Result, anyhow};
use std::time::Duration;

/// Pipeline environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEnvConfig {
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub task_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for PipelineEnvConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(pool.max_workers),
            queue_capacity: pool.queue_capacity,
            task_timeout_ms: pool.task_timeout.as_millis() as u64,
            shutdown_grace_ms: pool.shutdown_grace.as_millis() as u64,
        }
    }
}

impl PipelineEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            max_workers: super::parse_env("MAX_WORKERS", defaults.max_workers)?,
            queue_capacity: super::parse_env("QUEUE_CAPACITY", defaults.queue_capacity)?,
            task_timeout_ms: super::parse_env("TASK_TIMEOUT_MS", defaults.task_timeout_ms)?,
            shutdown_grace_ms: super::parse_env("SHUTDOWN_GRACE_MS", defaults.shutdown_grace_ms)?,
        };
        if config.max_workers == 0 || config.queue_capacity == 0 {
            return Err(anyhow!("MAX_WORKERS and QUEUE_CAPACITY must be positive"));
        }
        if config.task_timeout_ms == 0 {
            return Err(anyhow!("TASK_TIMEOUT_MS must be positive"));
        }
        Ok(config)
    }

    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_workers: self.max_workers,
            queue_capacity: self.queue_capacity,
            task_timeout: Duration::from_millis(self.task_timeout_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}
