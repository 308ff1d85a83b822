// Market data domain
pub mod candle;
pub mod events;
pub mod interval;
pub mod session;
pub mod universe;
