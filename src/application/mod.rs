// Technical indicator library and source-backed indicator service
pub mod indicators;

// Candle aggregation and indicator memoization
pub mod market_data;

// Worker pool, batch fan-out, cancellation
pub mod pipeline;

// Engine facade
pub mod system;

pub use system::{Engine, EngineStats};
