pub mod aggregation_service;
pub mod bucket_aggregator;
pub mod indicator_cache;
pub mod live_aggregator;

pub use aggregation_service::{AggregationService, BandSettings};
pub use bucket_aggregator::{BucketAggregator, BucketStream, SkipStats};
pub use indicator_cache::{CacheStats, Fingerprint, IndicatorCache};
pub use live_aggregator::LiveAggregator;
