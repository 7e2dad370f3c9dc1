//! The evicting cache store.

use super::entry::{CacheEntry, EntrySummary};
use super::lru::LruList;
use super::stats::CacheStats;
use crate::notify::FileStamp;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Shortest interval the background sweep will run at.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Fixed-capacity, time-bounded cache of parsed configurations with LRU eviction.
///
/// Every operation, including lookups, runs inside one exclusive section
/// because a hit reorders the recency list. The map is the source of truth:
/// when the list disagrees with it, only the offending list node is removed.
///
/// # Examples
///
/// ```rust
/// use config_hotreload::cache::EvictingCache;
/// use config_hotreload::notify::FileStamp;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let cache = EvictingCache::new(2, Duration::from_secs(60));
/// let stamp = FileStamp::new(12, None);
///
/// cache.put("app.yaml", Arc::new(42), stamp, String::new());
/// assert_eq!(cache.get(&"app.yaml", stamp).as_deref(), Some(&42));
///
/// // A different size means the file changed, so the entry is dropped.
/// assert!(cache.get(&"app.yaml", FileStamp::new(13, None)).is_none());
/// ```
pub struct EvictingCache<K, T> {
    state: Mutex<CacheState<K, T>>,
    capacity: usize,
    ttl: Duration,
}

struct CacheState<K, T> {
    map: HashMap<K, CacheEntry<T>>,
    lru: LruList<K>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    invalidations: u64,
    anomalies: u64,
}

impl<K, T> EvictingCache<K, T>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Create a cache holding at most `capacity` entries for at most `ttl` each.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(CacheState {
                map: HashMap::with_capacity(capacity),
                lru: LruList::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
                invalidations: 0,
                anomalies: 0,
            }),
            capacity,
            ttl,
        }
    }

    /// Look up `key`, treating the entry as stale unless `stamp` matches the one it was loaded with.
    ///
    /// Stale and expired entries are removed immediately and reported as a miss.
    /// A hit moves the entry to the most recently used position.
    pub fn get(&self, key: &K, stamp: FileStamp) -> Option<Arc<T>> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(entry) = state.map.get_mut(key) else {
            state.misses += 1;
            debug!(key = ?key, "cache miss");
            return None;
        };

        if !entry.matches(&stamp) {
            debug!(key = ?key, cached = entry.stamp.size, current = stamp.size, "cache entry is stale");
            state.remove_entry(key);
            state.invalidations += 1;
            state.misses += 1;
            return None;
        }

        if entry.is_expired(now, self.ttl) {
            debug!(key = ?key, "cache entry expired");
            state.remove_entry(key);
            state.expirations += 1;
            state.misses += 1;
            return None;
        }

        entry.last_access = now;
        entry.access_count += 1;
        let config = Arc::clone(&entry.config);

        if !state.lru.move_to_front(entry.node) {
            error!(key = ?key, node = entry.node, "cache entry has no live LRU node, relinking");
            entry.node = state.lru.push_front(key.clone());
            state.anomalies += 1;
        }

        state.hits += 1;
        debug!(key = ?key, "cache hit");
        Some(config)
    }

    /// Store a freshly loaded configuration.
    ///
    /// An existing key is refreshed in place. A new key first evicts least
    /// recently used entries until there is room, giving up after
    /// `capacity + 1` attempts so a corrupted list cannot stall insertion.
    pub fn put(&self, key: K, config: Arc<T>, stamp: FileStamp, content_hash: String) {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(entry) = state.map.get_mut(&key) {
            entry.refresh(config, content_hash, stamp, now);
            if !state.lru.move_to_front(entry.node) {
                error!(key = ?key, node = entry.node, "cache entry has no live LRU node, relinking");
                entry.node = state.lru.push_front(key.clone());
                state.anomalies += 1;
            }
            return;
        }

        let ceiling = self.capacity + 1;
        let mut attempts = 0;
        while state.map.len() >= self.capacity {
            if attempts >= ceiling {
                error!(
                    key = ?key,
                    entries = state.map.len(),
                    lru_nodes = state.lru.len(),
                    "eviction made no progress, cache state is corrupted; inserting anyway"
                );
                state.anomalies += 1;
                break;
            }
            attempts += 1;
            state.evict_lru();
        }

        let node = state.lru.push_front(key.clone());
        state
            .map
            .insert(key, CacheEntry::new(config, content_hash, stamp, node, now));
    }

    /// Remove every entry whose age exceeds the time-to-live. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired: Vec<K> = state
            .map
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, self.ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove_entry(key);
        }
        state.expirations += expired.len() as u64;
        expired.len()
    }

    /// Drop a single entry regardless of its state.
    pub fn invalidate(&self, key: &K) -> bool {
        self.state.lock().remove_entry(key)
    }

    /// Remove all entries. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.map.clear();
        state.lru.clear();
    }

    /// Diagnostic view of an entry without touching its recency.
    pub fn peek(&self, key: &K) -> Option<EntrySummary> {
        let now = Instant::now();
        self.state.lock().map.get(key).map(|entry| entry.summary(now))
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        self.state.lock().lru.keys().cloned().collect()
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.map.len(),
            lru_nodes: state.lru.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            invalidations: state.invalidations,
            anomalies: state.anomalies,
        }
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum age of an entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Interval the background sweep runs at: a quarter of the time-to-live.
    pub fn sweep_interval(&self) -> Duration {
        (self.ttl / 4).max(MIN_SWEEP_INTERVAL)
    }
}

impl<K, T> EvictingCache<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    T: Send + Sync + 'static,
{
    /// Spawn the periodic expiry sweep. It runs until `token` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = self.sweep_interval();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {
                        let removed = cache.sweep_expired();
                        if removed > 0 {
                            debug!(removed, "swept expired cache entries");
                        }
                    }
                }
            }
            debug!("cache sweeper stopped");
        })
    }
}

impl<K, T> CacheState<K, T>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Remove the least recently used entry.
    ///
    /// Returns `false` without touching the map when the tail node does not
    /// belong to the entry the map holds for its key; that node is discarded.
    fn evict_lru(&mut self) -> bool {
        let Some(node) = self.lru.back() else {
            return false;
        };
        let Some(key) = self.lru.key(node).cloned() else {
            return false;
        };

        let owned = self.map.get(&key).is_some_and(|entry| entry.node == node);
        if !owned {
            error!(key = ?key, node, "orphaned LRU node does not match the cache map, removing node only");
            self.lru.remove(node);
            self.anomalies += 1;
            return false;
        }

        self.lru.remove(node);
        self.map.remove(&key);
        self.evictions += 1;
        debug!(key = ?key, "evicted least recently used entry");
        true
    }

    /// Remove an entry and its list node. The node is only released if it still carries this key.
    fn remove_entry(&mut self, key: &K) -> bool {
        let Some(entry) = self.map.remove(key) else {
            return false;
        };
        if self.lru.key(entry.node) == Some(key) {
            self.lru.remove(entry.node);
        } else {
            error!(key = ?key, node = entry.node, "removed entry did not own its LRU node");
            self.anomalies += 1;
        }
        true
    }
}
