//! Lookup and store counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters shared by every clone of a cache.
#[derive(Debug, Default)]
pub(crate) struct AtomicStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub stale: AtomicU64,
    pub corrupt: AtomicU64,
    pub lookup_errors: AtomicU64,
    pub stores: AtomicU64,
    pub store_errors: AtomicU64,
    pub uncacheable: AtomicU64,
}

impl AtomicStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
            lookup_errors: self.lookup_errors.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            uncacheable: self.uncacheable.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the cache counters.
///
/// `misses` counts every request that went to the origin, whatever the
/// reason; `stale`, `corrupt` and `lookup_errors` break some of those down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Requests answered from storage.
    pub hits: u64,
    /// Requests forwarded to the origin.
    pub misses: u64,
    /// Stored entries found but not servable.
    pub stale: u64,
    /// Stored entries that failed to decode.
    pub corrupt: u64,
    /// Backend read failures other than "not found", or unparseable headers.
    pub lookup_errors: u64,
    /// Responses written to storage.
    pub stores: u64,
    /// Backend write failures.
    pub store_errors: u64,
    /// Origin responses that were not cacheable.
    pub uncacheable: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from storage, `0.0` before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
