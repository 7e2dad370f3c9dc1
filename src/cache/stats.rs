//! Cache statistics.

/// Point-in-time counters for an [`EvictingCache`](super::EvictingCache).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently in the map.
    pub entries: usize,
    /// Nodes currently linked in the recency list. Equal to `entries` when consistent.
    pub lru_nodes: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that found nothing usable, including stale entries.
    pub misses: u64,
    /// Entries removed to make room.
    pub evictions: u64,
    /// Entries removed because they outlived the time-to-live.
    pub expirations: u64,
    /// Entries removed because the file changed underneath them.
    pub invalidations: u64,
    /// Map/list inconsistencies that were detected and repaired.
    pub anomalies: u64,
}

impl CacheStats {
    /// Fraction of lookups that were hits, or `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Whether every map entry has exactly one list node.
    pub fn is_consistent(&self) -> bool {
        self.entries == self.lru_nodes
    }
}
