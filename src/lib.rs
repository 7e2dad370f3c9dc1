//! # config-hotreload
//!
//! Hot-reload a configuration file while the application keeps running.
//!
//! ## Overview
//!
//! `config-hotreload` polls one file for size and modification-time changes,
//! reloads it through a bounded parse cache, validates the result, and hands
//! the outcome to every registered subscriber:
//! - A polling [`FileWatcher`](notify::FileWatcher) that needs no platform notification API
//! - An [`EvictingCache`](cache::EvictingCache) bounded by entry count and age
//! - A [`CallbackRegistry`](notify::CallbackRegistry) that runs subscribers with a
//!   concurrency limit and a per-callback timeout
//! - A [`ConfigWatcher`](core::ConfigWatcher) that ties them together and keeps the
//!   last good configuration when a reload fails
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use config_hotreload::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, Clone)]
//! struct AppConfig {
//!     server: ServerConfig,
//! }
//!
//! #[derive(Debug, Deserialize, Clone)]
//! struct ServerConfig {
//!     port: u16,
//! }
//!
//! # async fn example() -> Result<()> {
//! let watcher = ConfigWatcher::<AppConfig>::builder("config/app.yaml")
//!     .with_detected_format()?
//!     .with_validation(|cfg: &AppConfig| {
//!         if cfg.server.port == 0 {
//!             return Err(ValidationError::invalid_field("server.port", "must be > 0"));
//!         }
//!         Ok(())
//!     })
//!     .build()?;
//!
//! watcher
//!     .subscribe(|_token, outcome: ReloadOutcome<AppConfig>| async move {
//!         if let Some(cfg) = outcome.config() {
//!             println!("Server port: {}", cfg.server.port);
//!         }
//!     })
//!     .await;
//!
//! watcher.start().await?;
//! let cfg = watcher.current();
//! # let _ = cfg;
//! watcher.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `validation` (default): the [`Validate`](core::Validate) trait for self-validating types
//! - `metrics`: OpenTelemetry counters for reloads, cache lookups and dispatches

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod cache;
pub mod core;
pub mod error;
pub mod notify;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{ConfigWatcher, ConfigWatcherBuilder, Format, WatcherSettings};
    pub use crate::error::{ConfigError, Result, ValidationError};
    pub use crate::notify::ReloadOutcome;
    pub use tokio_util::sync::CancellationToken;

    #[cfg(feature = "validation")]
    pub use crate::core::Validate;
}
