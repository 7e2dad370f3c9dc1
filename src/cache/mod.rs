//! Evicting cache of parsed configurations.
//!
//! Maps a file identity to the configuration most recently parsed from it,
//! bounded both by entry count (least recently used entries go first) and by
//! age (entries older than the time-to-live are dropped on lookup and by a
//! periodic sweep).

mod entry;
mod lru;
mod stats;
mod store;

pub use entry::EntrySummary;
pub use stats::CacheStats;
pub use store::EvictingCache;
