//! Configuration change notification system.
//!
//! Provides a polling file watcher and a subscriber registry that fans reload
//! outcomes out under a bounded concurrency budget.

pub mod subscriber;
pub mod watcher;

pub use subscriber::{
    CallbackRegistry, DispatchReport, DispatchStats, ReloadOutcome, SubscriberId,
};
pub use watcher::{FileStamp, FileWatcher, WatchEvent};
