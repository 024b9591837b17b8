//! Cache statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of node cache counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub forward_hits: u64,
    pub forward_misses: u64,
    pub backward_hits: u64,
    pub backward_misses: u64,
    /// Writes handed to the storage endpoint
    pub puts_issued: u64,
    /// Dead weak entries swept from either table
    pub purged: u64,
}

impl CacheStats {
    /// Fraction of forward lookups served from memory
    pub fn forward_hit_ratio(&self) -> f64 {
        ratio(self.forward_hits, self.forward_misses)
    }

    /// Fraction of fingerprinting calls that skipped re-hashing
    pub fn backward_hit_ratio(&self) -> f64 {
        ratio(self.backward_hits, self.backward_misses)
    }
}

fn ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    forward_hits: AtomicU64,
    forward_misses: AtomicU64,
    backward_hits: AtomicU64,
    backward_misses: AtomicU64,
    puts_issued: AtomicU64,
    purged: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn forward(&self, hit: bool) {
        let counter = if hit {
            &self.forward_hits
        } else {
            &self.forward_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn backward(&self, hit: bool) {
        let counter = if hit {
            &self.backward_hits
        } else {
            &self.backward_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn put_issued(&self) {
        self.puts_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn purged(&self, count: usize) {
        self.purged.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            forward_hits: self.forward_hits.load(Ordering::Relaxed),
            forward_misses: self.forward_misses.load(Ordering::Relaxed),
            backward_hits: self.backward_hits.load(Ordering::Relaxed),
            backward_misses: self.backward_misses.load(Ordering::Relaxed),
            puts_issued: self.puts_issued.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
        }
    }
}
