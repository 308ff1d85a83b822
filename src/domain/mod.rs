// Candle model, session calendar, listener contract
pub mod market;

// Indicator kinds, parameters, series
pub mod indicators;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
