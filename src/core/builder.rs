//! Builder for constructing ConfigWatcher instances.

use crate::core::settings::{WatcherSettings, millis_ceil};
use crate::core::{ConfigWatcher, Format, FormatLoader, Loader, Validator};
use crate::error::{ConfigError, Result, ValidationError};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "validation")]
use crate::core::Validate;
#[cfg(feature = "validation")]
use crate::core::validation::SelfValidating;

#[cfg(feature = "metrics")]
use crate::metrics::ConfigMetrics;

/// Builder for constructing a `ConfigWatcher` instance.
///
/// Provides a fluent interface for the loader, validators and tunables.
///
/// # Examples
///
/// ```rust,no_run
/// use config_hotreload::prelude::*;
/// use serde::Deserialize;
/// use std::time::Duration;
///
/// #[derive(Debug, Deserialize, Clone)]
/// struct ScraperConfig {
///     concurrency: usize,
/// }
///
/// # fn example() -> Result<()> {
/// let watcher = ConfigWatcher::<ScraperConfig>::builder("config/scraper.yaml")
///     .with_detected_format()?
///     .with_validation(|cfg: &ScraperConfig| {
///         if cfg.concurrency == 0 {
///             return Err(ValidationError::invalid_field("concurrency", "must be > 0"));
///         }
///         Ok(())
///     })
///     .with_poll_interval(Duration::from_millis(500))
///     .with_max_workers(8)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ConfigWatcherBuilder<T> {
    path: PathBuf,
    loader: Option<Arc<dyn Loader<T>>>,
    validators: Vec<Arc<dyn Validator<T>>>,
    settings: WatcherSettings,
    #[cfg(feature = "metrics")]
    metrics: Option<ConfigMetrics>,
}

impl<T> ConfigWatcherBuilder<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new builder for the file at `path` with default settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loader: None,
            validators: Vec::new(),
            settings: WatcherSettings::default(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Use a custom loader to turn file contents into a configuration.
    pub fn with_loader<L: Loader<T> + 'static>(mut self, loader: L) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Decode the file as `format`.
    pub fn with_format(self, format: Format) -> Self
    where
        T: DeserializeOwned,
    {
        self.with_loader(FormatLoader::new(format))
    }

    /// Decode the file in the format implied by its extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is missing or unsupported.
    pub fn with_detected_format(self) -> Result<Self>
    where
        T: DeserializeOwned,
    {
        let loader = FormatLoader::from_path(&self.path)?;
        Ok(self.with_loader(loader))
    }

    /// Add a validation function that must pass before a reload is accepted.
    ///
    /// Validators run in the order they were added; the first failure wins.
    pub fn with_validation<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Validate reloads with the configuration type's own [`Validate`] impl.
    #[cfg(feature = "validation")]
    pub fn with_validate(mut self) -> Self
    where
        T: Validate,
    {
        self.validators.push(Arc::new(SelfValidating));
        self
    }

    /// Replace all tunables at once.
    pub fn with_settings(mut self, settings: WatcherSettings) -> Self {
        self.settings = settings;
        self
    }

    /// How often the file is polled.
    ///
    /// Settings are kept in whole milliseconds; durations are rounded up.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval_ms = millis_ceil(interval);
        self
    }

    /// Maximum number of parsed configurations kept in the cache.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.settings.cache_capacity = capacity;
        self
    }

    /// Maximum age of a cached configuration.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.settings.cache_ttl_ms = millis_ceil(ttl);
        self
    }

    /// Maximum number of subscriber callbacks running at once.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.settings.max_workers = max_workers;
        self
    }

    /// Time a subscriber callback may run before it is asked to stop.
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.settings.callback_timeout_ms = millis_ceil(timeout);
        self
    }

    /// Time to wait for a late callback after a timeout or cancellation.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.settings.grace_period_ms = millis_ceil(grace);
        self
    }

    /// Record OpenTelemetry metrics for reloads and dispatches.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(ConfigMetrics::new(meter));
        self
    }

    /// Build the watcher. Nothing is read from disk until [`ConfigWatcher::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No loader was configured
    /// - A setting is zero
    pub fn build(self) -> Result<ConfigWatcher<T>> {
        self.settings.validate()?;

        let loader = self.loader.ok_or_else(|| {
            ConfigError::InvalidSettings(
                "no loader configured; call with_loader, with_format or with_detected_format"
                    .to_string(),
            )
        })?;

        let watcher = ConfigWatcher::from_parts(self.path, self.settings, loader, self.validators);
        #[cfg(feature = "metrics")]
        let watcher = watcher.with_metrics(self.metrics);
        Ok(watcher)
    }
}
