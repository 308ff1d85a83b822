use prometheus::Histogram;
use std::time::Instant;

/// Times a scope and observes the elapsed seconds on drop.
///
/// Without a histogram the guard records nothing, so computation paths
/// read the same whether metrics are wired or not.
pub struct LatencyGuard {
    start: Instant,
    histogram: Option<Histogram>,
}

impl LatencyGuard {
    pub fn maybe(histogram: Option<&Histogram>) -> Self {
        Self {
            start: Instant::now(),
            histogram: histogram.cloned(),
        }
    }
}

impl Drop for LatencyGuard {
    fn drop(&mut self) {
        if let Some(histogram) = &self.histogram {
            histogram.observe(self.start.elapsed().as_secs_f64());
        }
    }
}
