//! Cached configuration entries.

use super::lru::NodeId;
use crate::notify::FileStamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A parsed configuration held by the cache.
pub(crate) struct CacheEntry<T> {
    pub(crate) config: Arc<T>,
    /// SHA-256 of the bytes the configuration was parsed from, hex encoded.
    pub(crate) content_hash: String,
    pub(crate) loaded_at: Instant,
    pub(crate) last_access: Instant,
    pub(crate) stamp: FileStamp,
    pub(crate) access_count: u64,
    /// Position in the recency list. Must point back at a node holding this entry's key.
    pub(crate) node: NodeId,
}

impl<T> CacheEntry<T> {
    pub(crate) fn new(
        config: Arc<T>,
        content_hash: String,
        stamp: FileStamp,
        node: NodeId,
        now: Instant,
    ) -> Self {
        Self {
            config,
            content_hash,
            loaded_at: now,
            last_access: now,
            stamp,
            access_count: 0,
            node,
        }
    }

    /// Replace the payload in place, keeping the list node.
    pub(crate) fn refresh(
        &mut self,
        config: Arc<T>,
        content_hash: String,
        stamp: FileStamp,
        now: Instant,
    ) {
        self.config = config;
        self.content_hash = content_hash;
        self.stamp = stamp;
        self.loaded_at = now;
        self.last_access = now;
    }

    pub(crate) fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.loaded_at) >= ttl
    }

    pub(crate) fn matches(&self, stamp: &FileStamp) -> bool {
        self.stamp == *stamp
    }

    pub(crate) fn summary(&self, now: Instant) -> EntrySummary {
        EntrySummary {
            content_hash: self.content_hash.clone(),
            stamp: self.stamp,
            access_count: self.access_count,
            age: now.saturating_duration_since(self.loaded_at),
            idle: now.saturating_duration_since(self.last_access),
        }
    }
}

/// Read-only view of a cache entry, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    /// SHA-256 of the source bytes, hex encoded.
    pub content_hash: String,
    /// File size and modification time recorded at load time.
    pub stamp: FileStamp,
    /// Number of cache hits served by this entry.
    pub access_count: u64,
    /// Time since the entry was loaded.
    pub age: Duration,
    /// Time since the entry was last read or written.
    pub idle: Duration,
}
