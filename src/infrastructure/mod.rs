pub mod csv_source;
pub mod event_bus;
pub mod mock;
pub mod observability;
pub mod repositories;

pub use csv_source::CsvCandleSource;
pub use event_bus::{CloseEventBus, NotifyReport};
pub use mock::SyntheticCandleSource;
pub use repositories::InMemoryCandleRepository;
