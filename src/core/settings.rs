//! Tunables for the watcher, cache and dispatcher.

use crate::core::{Format, FormatLoader, Loader};
use crate::error::{ConfigError, Result};
use crate::notify::subscriber::{DEFAULT_CALLBACK_TIMEOUT, DEFAULT_GRACE_PERIOD, DEFAULT_MAX_WORKERS};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Settings for a [`ConfigWatcher`](crate::core::ConfigWatcher).
///
/// Every field has a default, so a settings file only needs the values it changes.
///
/// ```yaml
/// poll_interval_ms: 500
/// max_workers: 8
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    /// How often the watched file is stated.
    pub poll_interval_ms: u64,
    /// Maximum number of parsed configurations kept in the cache.
    pub cache_capacity: usize,
    /// Maximum age of a cached configuration.
    pub cache_ttl_ms: u64,
    /// Maximum number of subscriber callbacks running at once.
    pub max_workers: usize,
    /// Time a subscriber callback may run before it is asked to stop.
    pub callback_timeout_ms: u64,
    /// Time to wait for a late callback after a timeout or cancellation.
    pub grace_period_ms: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            cache_capacity: 16,
            cache_ttl_ms: 300_000,
            max_workers: DEFAULT_MAX_WORKERS,
            callback_timeout_ms: DEFAULT_CALLBACK_TIMEOUT.as_millis() as u64,
            grace_period_ms: DEFAULT_GRACE_PERIOD.as_millis() as u64,
        }
    }
}

/// Whole milliseconds in `duration`, rounded up so a non-zero duration never becomes 0.
pub(crate) fn millis_ceil(duration: Duration) -> u64 {
    let mut millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    u64::try_from(millis).unwrap_or(u64::MAX)
}

impl WatcherSettings {
    /// Load settings from a YAML, TOML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or fails [`validate`](Self::validate).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let loader = FormatLoader::from_path(path)?;
        let raw = std::fs::read(path)?;
        let settings: Self = loader.load(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from an in-memory document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or fails [`validate`](Self::validate).
    pub fn from_document(raw: &str, format: Format) -> Result<Self> {
        let settings: Self = FormatLoader::new(format).load(raw.as_bytes())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject zero values, which would stall polling or disable the cache or dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSettings`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("poll_interval_ms", self.poll_interval_ms == 0),
            ("cache_capacity", self.cache_capacity == 0),
            ("cache_ttl_ms", self.cache_ttl_ms == 0),
            ("max_workers", self.max_workers == 0),
            ("callback_timeout_ms", self.callback_timeout_ms == 0),
        ];

        match checks.iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ConfigError::InvalidSettings(format!(
                "{} must be greater than 0",
                field
            ))),
            None => Ok(()),
        }
    }

    /// [`poll_interval_ms`](Self::poll_interval_ms) as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// [`cache_ttl_ms`](Self::cache_ttl_ms) as a `Duration`.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// [`callback_timeout_ms`](Self::callback_timeout_ms) as a `Duration`.
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    /// [`grace_period_ms`](Self::grace_period_ms) as a `Duration`.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}
