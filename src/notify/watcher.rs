//! Polling file watcher.
//!
//! The watcher stats the target on a fixed interval and compares the file's
//! size and modification time against the last values it saw. Detection
//! latency is therefore bounded by the poll interval.

use std::fs::Metadata;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Size and modification time of a file at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileStamp {
    /// File length in bytes.
    pub size: u64,
    /// Last modification time, if the platform reports one.
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    /// Create a stamp from raw values.
    pub fn new(size: u64, modified: Option<SystemTime>) -> Self {
        Self { size, modified }
    }

    /// Build a stamp from file metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }

    /// Stat `path` and return its current stamp.
    pub async fn read(path: impl AsRef<Path>) -> io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self::from_metadata(&metadata))
    }
}

/// Result of a poll that observed something worth reporting.
#[derive(Debug)]
pub enum WatchEvent {
    /// The file's size or modification time differs from the last observation.
    Changed(FileStamp),
    /// The file could not be stated. Reported on every poll until it can be.
    Unreadable(io::Error),
}

/// Polls one file for modifications.
///
/// # Examples
///
/// ```rust,no_run
/// use config_hotreload::notify::{FileWatcher, WatchEvent};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> std::io::Result<()> {
/// let mut watcher = FileWatcher::new("/etc/app/config.yaml", Duration::from_secs(1));
/// watcher.capture_baseline().await?;
///
/// let token = CancellationToken::new();
/// let handle = watcher.spawn(token.clone(), |event| async move {
///     if let WatchEvent::Changed(stamp) = event {
///         println!("config changed, now {} bytes", stamp.size);
///     }
/// });
///
/// // Later
/// token.cancel();
/// handle.await.ok();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileWatcher {
    path: PathBuf,
    interval: Duration,
    last_seen: Option<FileStamp>,
}

impl FileWatcher {
    /// Create a watcher for `path` that polls every `interval`.
    ///
    /// Without a baseline the first successful poll reports a change.
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_seen: None,
        }
    }

    /// Record the file's current stamp as the reference for later polls.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be stated.
    pub async fn capture_baseline(&mut self) -> io::Result<FileStamp> {
        let stamp = FileStamp::read(&self.path).await?;
        self.last_seen = Some(stamp);
        Ok(stamp)
    }

    /// Stat the file once.
    ///
    /// The new stamp is recorded before the event is returned, so a change is
    /// reported at most once no matter what the caller does with it.
    pub async fn poll(&mut self) -> Option<WatchEvent> {
        match FileStamp::read(&self.path).await {
            Ok(stamp) if self.last_seen == Some(stamp) => None,
            Ok(stamp) => {
                debug!(path = %self.path.display(), size = stamp.size, "file change detected");
                self.last_seen = Some(stamp);
                Some(WatchEvent::Changed(stamp))
            }
            Err(e) => {
                // Forget the old stamp so the file reappearing counts as a change.
                self.last_seen = None;
                Some(WatchEvent::Unreadable(e))
            }
        }
    }

    /// Poll until `token` is cancelled, awaiting `on_event` inline for every event.
    pub async fn run<F, Fut>(mut self, token: CancellationToken, mut on_event: F)
    where
        F: FnMut(WatchEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        info!(
            path = %self.path.display(),
            interval_ms = self.interval.as_millis() as u64,
            "file watcher started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the baseline already covers it.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(event) = self.poll().await else {
                continue;
            };
            if token.is_cancelled() {
                break;
            }
            if let WatchEvent::Unreadable(e) = &event {
                warn!(path = %self.path.display(), error = %e, "cannot stat watched file");
            }
            on_event(event).await;
        }

        info!(path = %self.path.display(), "file watcher stopped");
    }

    /// Run the poll loop on a background task.
    pub fn spawn<F, Fut>(self, token: CancellationToken, on_event: F) -> JoinHandle<()>
    where
        F: FnMut(WatchEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(token, on_event))
    }

    /// The watched path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time between polls.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The most recently observed stamp, if the last poll succeeded.
    pub fn last_seen(&self) -> Option<FileStamp> {
        self.last_seen
    }
}
