//! The reload coordinator.

use crate::cache::{CacheStats, EvictingCache};
use crate::core::builder::ConfigWatcherBuilder;
use crate::core::settings::WatcherSettings;
use crate::core::{Loader, Validator};
use crate::error::{ConfigError, Result};
use crate::notify::{
    CallbackRegistry, DispatchStats, FileStamp, FileWatcher, ReloadOutcome, SubscriberId,
    WatchEvent,
};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::ConfigMetrics;

/// Lifecycle of a [`ConfigWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Built but not started.
    Idle,
    /// Polling the file.
    Running,
    /// Stopped for good.
    Stopped,
}

/// Counters and nested statistics for a [`ConfigWatcher`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatcherStats {
    /// Current lifecycle state.
    pub state: WatcherState,
    /// Reloads that produced a new validated configuration.
    pub reloads: u64,
    /// Reloads that failed to read, parse or validate.
    pub failures: u64,
    /// I/O errors while stating or reading the watched file.
    pub io_errors: u64,
    /// Parse cache statistics.
    pub cache: CacheStats,
    /// Subscriber dispatch statistics.
    pub dispatch: DispatchStats,
}

#[derive(Default)]
struct ReloadCounters {
    reloads: AtomicU64,
    failures: AtomicU64,
    io_errors: AtomicU64,
}

struct Shared<T> {
    path: PathBuf,
    loader: Arc<dyn Loader<T>>,
    validators: Vec<Arc<dyn Validator<T>>>,
    cache: Arc<EvictingCache<PathBuf, T>>,
    registry: CallbackRegistry<T>,
    current: ArcSwapOption<T>,
    counters: ReloadCounters,
    #[cfg(feature = "metrics")]
    metrics: Option<ConfigMetrics>,
}

/// Watches one configuration file and notifies subscribers whenever it changes.
///
/// On every detected change the file is reloaded through the parse cache,
/// validated, and the result (the new configuration or the error) is fanned
/// out to subscribers. Failures never replace the last good configuration.
///
/// `start()` moves the watcher from idle to running; `stop()` moves it to
/// stopped, which is terminal. `stop()` can be called any number of times.
///
/// # Examples
///
/// ```rust,no_run
/// use config_hotreload::prelude::*;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize, Clone)]
/// struct ScraperConfig {
///     concurrency: usize,
/// }
///
/// # async fn example() -> Result<()> {
/// let watcher = ConfigWatcher::<ScraperConfig>::builder("config/scraper.yaml")
///     .with_detected_format()?
///     .build()?;
///
/// watcher
///     .subscribe_named("engine", |_token, outcome: ReloadOutcome<ScraperConfig>| async move {
///         match outcome {
///             ReloadOutcome::Reloaded(cfg) => println!("concurrency is now {}", cfg.concurrency),
///             ReloadOutcome::Failed(err) => eprintln!("keeping old config: {}", err),
///         }
///     })
///     .await;
///
/// watcher.start().await?;
/// // ...
/// watcher.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct ConfigWatcher<T> {
    shared: Arc<Shared<T>>,
    settings: WatcherSettings,
    state: Mutex<WatcherState>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T> ConfigWatcher<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new builder for watching the file at `path`.
    pub fn builder(path: impl Into<PathBuf>) -> ConfigWatcherBuilder<T> {
        ConfigWatcherBuilder::new(path)
    }

    pub(crate) fn from_parts(
        path: PathBuf,
        settings: WatcherSettings,
        loader: Arc<dyn Loader<T>>,
        validators: Vec<Arc<dyn Validator<T>>>,
    ) -> Self {
        let cache = Arc::new(EvictingCache::new(settings.cache_capacity, settings.cache_ttl()));
        let registry = CallbackRegistry::new(
            settings.max_workers,
            settings.callback_timeout(),
            settings.grace_period(),
        );

        Self {
            shared: Arc::new(Shared {
                path,
                loader,
                validators,
                cache,
                registry,
                current: ArcSwapOption::empty(),
                counters: ReloadCounters::default(),
                #[cfg(feature = "metrics")]
                metrics: None,
            }),
            settings,
            state: Mutex::new(WatcherState::Idle),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn with_metrics(mut self, metrics: Option<ConfigMetrics>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.metrics = metrics;
        }
        self
    }

    /// Start polling.
    ///
    /// Captures the file's current size and modification time as the baseline,
    /// loads it once to seed the cache and [`current`](Self::current), then
    /// launches the poll loop and the cache sweep. A failed initial load is
    /// logged and does not prevent the watcher from running.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The watcher is already running ([`ConfigError::AlreadyRunning`])
    /// - The watcher has been stopped, including by a `stop()` that ran while
    ///   this call was loading ([`ConfigError::Stopped`])
    /// - The file cannot be stated
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                WatcherState::Running => return Err(ConfigError::AlreadyRunning),
                WatcherState::Stopped => return Err(ConfigError::Stopped),
                WatcherState::Idle => *state = WatcherState::Running,
            }
        }

        let mut watcher = FileWatcher::new(&self.shared.path, self.settings.poll_interval());
        let baseline = match watcher.capture_baseline().await {
            Ok(stamp) => stamp,
            Err(e) => {
                let mut state = self.state.lock();
                if *state == WatcherState::Running {
                    *state = WatcherState::Idle;
                }
                return Err(ConfigError::WatchError(format!(
                    "Failed to stat {}: {}",
                    self.shared.path.display(),
                    e
                )));
            }
        };

        if let Err(e) = self.shared.reload(baseline).await {
            warn!(path = %self.shared.path.display(), error = %e, "initial configuration load failed");
        }

        // Held while spawning so a concurrent stop() either sees the tasks or wins first.
        let state = self.state.lock();
        if *state != WatcherState::Running {
            debug!(path = %self.shared.path.display(), "config watcher stopped during start");
            return Err(ConfigError::Stopped);
        }

        let sweeper = self.shared.cache.spawn_sweeper(self.shutdown.child_token());

        let shared = Arc::clone(&self.shared);
        let dispatch_token = self.shutdown.clone();
        let poller = watcher.spawn(self.shutdown.child_token(), move |event| {
            let shared = Arc::clone(&shared);
            let token = dispatch_token.clone();
            async move { shared.handle_event(&token, event).await }
        });

        self.tasks.lock().extend([sweeper, poller]);
        drop(state);
        info!(
            path = %self.shared.path.display(),
            size = baseline.size,
            "config watcher started"
        );
        Ok(())
    }

    /// Stop polling and cancel in-flight dispatches.
    ///
    /// Running callbacks are asked to stop through their tokens and given the
    /// grace period to do so; they are never waited on beyond that. Calling
    /// `stop()` again, or from several tasks at once, is a no-op.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), WatcherState::Stopped);
        if previous == WatcherState::Stopped {
            debug!(path = %self.shared.path.display(), "config watcher already stopped");
            return;
        }

        self.shutdown.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "config watcher task ended abnormally");
            }
        }

        info!(path = %self.shared.path.display(), "config watcher stopped");
    }

    /// Reload immediately, outside the poll schedule, and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Stopped`] if the watcher has been stopped. Reload
    /// failures are not errors here; they are returned as [`ReloadOutcome::Failed`].
    pub async fn reload_now(&self) -> Result<ReloadOutcome<T>> {
        if self.state() == WatcherState::Stopped {
            return Err(ConfigError::Stopped);
        }

        let outcome = match FileStamp::read(&self.shared.path).await {
            Ok(stamp) => self.shared.reload_outcome(stamp).await,
            Err(e) => self.shared.io_failure(e),
        };
        self.shared.dispatch(&self.shutdown, outcome.clone()).await;
        Ok(outcome)
    }

    /// The last configuration that loaded and validated, if any.
    pub fn current(&self) -> Option<Arc<T>> {
        self.shared.current.load_full()
    }

    /// Register a subscriber.
    pub async fn subscribe<F, Fut>(&self, callback: F) -> SubscriberId
    where
        F: Fn(CancellationToken, ReloadOutcome<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.shared.registry.register(callback).await;
        self.shared.report_subscribers().await;
        id
    }

    /// Register a subscriber with a name used in diagnostics.
    pub async fn subscribe_named<F, Fut>(&self, name: impl Into<String>, callback: F) -> SubscriberId
    where
        F: Fn(CancellationToken, ReloadOutcome<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.shared.registry.register_named(name, callback).await;
        self.shared.report_subscribers().await;
        id
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.shared.registry.unregister(id).await;
        self.shared.report_subscribers().await;
        removed
    }

    /// The subscriber registry.
    pub fn registry(&self) -> &CallbackRegistry<T> {
        &self.shared.registry
    }

    /// The parse cache.
    pub fn cache(&self) -> &EvictingCache<PathBuf, T> {
        &self.shared.cache
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatcherState {
        *self.state.lock()
    }

    /// The watched file.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Settings the watcher was built with.
    pub fn settings(&self) -> &WatcherSettings {
        &self.settings
    }

    /// Snapshot of all counters.
    pub fn stats(&self) -> WatcherStats {
        let counters = &self.shared.counters;
        WatcherStats {
            state: self.state(),
            reloads: counters.reloads.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            io_errors: counters.io_errors.load(Ordering::Relaxed),
            cache: self.shared.cache.stats(),
            dispatch: self.shared.registry.stats(),
        }
    }
}

impl<T> Drop for ConfigWatcher<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<T> Shared<T>
where
    T: Send + Sync + 'static,
{
    async fn handle_event(&self, token: &CancellationToken, event: WatchEvent) {
        let outcome = match event {
            WatchEvent::Changed(stamp) => self.reload_outcome(stamp).await,
            WatchEvent::Unreadable(e) => self.io_failure(e),
        };
        self.dispatch(token, outcome).await;
    }

    async fn reload_outcome(&self, stamp: FileStamp) -> ReloadOutcome<T> {
        match self.reload(stamp).await {
            Ok(config) => ReloadOutcome::Reloaded(config),
            Err(e) => ReloadOutcome::Failed(Arc::new(e)),
        }
    }

    fn io_failure(&self, e: std::io::Error) -> ReloadOutcome<T> {
        self.counters.io_errors.fetch_add(1, Ordering::Relaxed);
        ReloadOutcome::Failed(Arc::new(ConfigError::IoError(e)))
    }

    /// Load the file as of `stamp`, going through the cache, and validate the result.
    async fn reload(&self, stamp: FileStamp) -> Result<Arc<T>> {
        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(ConfigMetrics::start_reload);

        let result = self.load_and_validate(stamp).await;

        match &result {
            Ok(_) => {
                self.counters.reloads.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "reload failed, keeping last good configuration"
                );
            }
        }

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            match &result {
                Ok(_) => metrics.record_reload_success(timer),
                Err(ConfigError::ValidationError(_)) => {
                    metrics.record_validation_failure();
                    metrics.record_reload_failure(timer);
                }
                Err(_) => metrics.record_reload_failure(timer),
            }
        }

        result
    }

    async fn load_and_validate(&self, stamp: FileStamp) -> Result<Arc<T>> {
        let cached = self.cache.get(&self.path, stamp);

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(cached.is_some());
        }

        let (config, content_hash) = match cached {
            Some(config) => (config, None),
            None => {
                let raw = tokio::fs::read(&self.path).await.map_err(|e| {
                    self.counters.io_errors.fetch_add(1, Ordering::Relaxed);
                    ConfigError::IoError(e)
                })?;
                let hash = content_hash(&raw);
                (Arc::new(self.loader.load(&raw)?), Some(hash))
            }
        };

        for validator in &self.validators {
            validator.validate(&config)?;
        }

        let from_cache = content_hash.is_none();
        if let Some(hash) = content_hash {
            debug!(path = %self.path.display(), hash = %hash, "caching parsed configuration");
            self.cache.put(self.path.clone(), Arc::clone(&config), stamp, hash);
        }

        self.current.store(Some(Arc::clone(&config)));
        info!(
            path = %self.path.display(),
            size = stamp.size,
            from_cache,
            "configuration reloaded"
        );
        Ok(config)
    }

    async fn dispatch(&self, token: &CancellationToken, outcome: ReloadOutcome<T>) {
        let _report = self.registry.execute(token, outcome).await;

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch(&_report);
            metrics.update_config_age();
        }
    }

    async fn report_subscribers(&self) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            let count = self.registry.subscriber_count().await;
            metrics.update_subscriber_count(count as i64);
        }
    }
}

fn content_hash(raw: &[u8]) -> String {
    format!("{:x}", Sha256::digest(raw))
}
