use crate::application::indicators::ComputeStrategy;
use crate::domain::indicators::{IndicatorSpec, IndicatorValue};
use crate::domain::market::interval::Interval;
use crate::infrastructure::observability::Metrics;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Identity of one indicator computation.
///
/// The digest is the map key; the canonical text is kept next to the value
/// and compared on every read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    canonical: String,
    digest: String,
}

impl Fingerprint {
    pub fn new(
        symbol: &str,
        spec: &IndicatorSpec,
        interval: Interval,
        start: i64,
        end: i64,
        strategy: ComputeStrategy,
    ) -> Self {
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            symbol,
            spec.kind(),
            spec.params_key(),
            interval,
            start,
            end,
            strategy
        );
        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
        Self { canonical, digest }
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
    pub bytes: usize,
    pub evictions: u64,
}

struct CacheEntry {
    canonical: String,
    values: Arc<Vec<IndicatorValue>>,
    bytes: usize,
    last_access: AtomicU64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    bytes: usize,
}

/// Memoizes indicator series by [`Fingerprint`] with LRU eviction under an
/// entry budget and an approximate byte budget.
pub struct IndicatorCache {
    state: RwLock<CacheState>,
    max_entries: usize,
    max_bytes: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    metrics: Option<Metrics>,
}

impl std::fmt::Debug for IndicatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorCache")
            .field("max_entries", &self.max_entries)
            .field("max_bytes", &self.max_bytes)
            .field("state", &"<RwLock>")
            .finish()
    }
}

impl IndicatorCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            max_entries,
            max_bytes,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Looks up a series; a hit refreshes the entry's recency.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<Vec<IndicatorValue>>> {
        let guard = match self.state.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let found = guard
            .entries
            .get(fingerprint.digest())
            .filter(|entry| entry.canonical == fingerprint.canonical())
            .map(|entry| {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                entry.values.clone()
            });
        drop(guard);

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            if let Some(metrics) = &self.metrics {
                metrics.inc_cache("hit");
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            if let Some(metrics) = &self.metrics {
                metrics.inc_cache("miss");
            }
        }
        found
    }

    /// Stores a series, evicting least-recently-used entries until both
    /// budgets hold. A series larger than the whole byte budget is not cached.
    pub fn put(&self, fingerprint: Fingerprint, values: Vec<IndicatorValue>) {
        let bytes = entry_size(&fingerprint, &values);
        if self.max_entries == 0 || bytes > self.max_bytes {
            debug!(
                "IndicatorCache: Not caching {} ({} bytes, budget {})",
                fingerprint.canonical(),
                bytes,
                self.max_bytes
            );
            return;
        }

        let entry = CacheEntry {
            canonical: fingerprint.canonical,
            values: Arc::new(values),
            bytes,
            last_access: AtomicU64::new(self.tick()),
        };

        let mut guard = match self.state.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::error!("IndicatorCache: Lock poisoned during write, recovering");
                poisoned.into_inner()
            }
        };

        if let Some(old) = guard.entries.insert(fingerprint.digest, entry) {
            guard.bytes -= old.bytes;
        }
        guard.bytes += bytes;

        let mut evicted = 0u64;
        while guard.entries.len() > self.max_entries || guard.bytes > self.max_bytes {
            let Some(victim) = guard
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            if let Some(removed) = guard.entries.remove(&victim) {
                guard.bytes -= removed.bytes;
                evicted += 1;
            }
        }
        let entries = guard.entries.len();
        drop(guard);

        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            debug!("IndicatorCache: Evicted {} entries", evicted);
        }
        if let Some(metrics) = &self.metrics {
            metrics.cache_evictions_total.inc_by(evicted as f64);
            metrics.cache_entries.set(entries as f64);
        }
    }

    /// Drops every entry in one write-locked step.
    pub fn clear(&self) {
        let mut guard = match self.state.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.entries.clear();
        guard.bytes = 0;
        drop(guard);

        if let Some(metrics) = &self.metrics {
            metrics.cache_entries.set(0.0);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = match self.state.read() {
            Ok(g) => (g.entries.len(), g.bytes),
            Err(poisoned) => {
                let g = poisoned.into_inner();
                (g.entries.len(), g.bytes)
            }
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entries,
            bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

fn entry_size(fingerprint: &Fingerprint, values: &[IndicatorValue]) -> usize {
    std::mem::size_of::<CacheEntry>()
        + fingerprint.canonical.len() * 2
        + fingerprint.digest.len()
        + std::mem::size_of_val(values)
}
