use crate::domain::indicators::IndicatorKind;
use thiserror::Error;

/// Configuration and input errors raised by indicator computation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("Invalid period for {kind}: {period} (must be positive)")]
    InvalidPeriod { kind: IndicatorKind, period: i64 },

    #[error("Invalid multiplier for {kind}: {multiplier} (must be finite and positive)")]
    InvalidMultiplier { kind: IndicatorKind, multiplier: f64 },

    #[error("Missing parameter '{name}' for {kind}")]
    MissingParameter { kind: IndicatorKind, name: &'static str },

    #[error("Parameter '{name}' is not a number: '{value}'")]
    MalformedParameter { name: &'static str, value: String },

    #[error("Unsupported indicator kind: {0}")]
    UnsupportedKind(String),

    #[error("Cannot compute indicators for {symbol}: empty candle series")]
    EmptySeries { symbol: String },
}

/// Errors related to candle data supplied by collaborators
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("Candle source failed for {symbol}: {reason}")]
    Source { symbol: String, reason: String },

    #[error("Invalid range for {symbol}: start {start} is after end {end}")]
    InvalidRange { symbol: String, start: i64, end: i64 },

    #[error("Interval {requested} cannot be built from {base} candles")]
    IncompatibleInterval { requested: String, base: String },
}

/// Errors raised by the worker pool
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Task '{label}' timed out after {timeout_ms}ms")]
    TaskTimeout { label: String, timeout_ms: u64 },

    #[error("Task '{label}' was aborted before completing")]
    TaskAborted { label: String },
}

impl PipelineError {
    /// Resource conditions the caller may retry later
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::QueueFull { .. } | PipelineError::ShutDown)
    }
}

/// Top-level error for engine operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Pipeline(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_error_formatting() {
        let error = IndicatorError::InvalidPeriod {
            kind: IndicatorKind::Ema,
            period: -3,
        };
        let msg = error.to_string();
        assert!(msg.contains("EMA"));
        assert!(msg.contains("-3"));

        let empty = IndicatorError::EmptySeries {
            symbol: "RELIANCE".to_string(),
        };
        assert!(empty.to_string().contains("RELIANCE"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::QueueFull { capacity: 4 }.is_retryable());
        assert!(PipelineError::ShutDown.is_retryable());
        assert!(
            !PipelineError::TaskTimeout {
                label: "x".into(),
                timeout_ms: 10
            }
            .is_retryable()
        );
        assert!(EngineError::from(PipelineError::ShutDown).is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
    }
}
