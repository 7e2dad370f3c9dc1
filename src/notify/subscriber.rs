//! Subscriber-based notifications for configuration changes.
//!
//! Every dispatch fans one [`ReloadOutcome`] out to all registered
//! subscribers. Concurrency is bounded by a fixed pool of slots; a subscriber
//! that cannot get a slot immediately is skipped for that dispatch instead of
//! queued. Each callback gets its own cancellation token and timeout, and a
//! panic inside one callback never reaches the dispatcher or its siblings.

use crate::error::ConfigError;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Default number of callbacks allowed to run at once.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default time a callback may run before it is asked to stop.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time to wait for a late completion after a timeout or cancellation.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// What a reload produced: a validated configuration or the error that prevented one.
#[derive(Debug)]
pub enum ReloadOutcome<T> {
    /// A new configuration was loaded and validated.
    Reloaded(Arc<T>),
    /// Loading, parsing or validation failed. The previous configuration stays in effect.
    Failed(Arc<ConfigError>),
}

impl<T> ReloadOutcome<T> {
    /// The new configuration, if the reload succeeded.
    pub fn config(&self) -> Option<&Arc<T>> {
        match self {
            Self::Reloaded(config) => Some(config),
            Self::Failed(_) => None,
        }
    }

    /// The error, if the reload failed.
    pub fn error(&self) -> Option<&ConfigError> {
        match self {
            Self::Reloaded(_) => None,
            Self::Failed(err) => Some(err),
        }
    }

    /// Whether the reload succeeded.
    pub fn is_reloaded(&self) -> bool {
        matches!(self, Self::Reloaded(_))
    }
}

impl<T> Clone for ReloadOutcome<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Reloaded(config) => Self::Reloaded(Arc::clone(config)),
            Self::Failed(err) => Self::Failed(Arc::clone(err)),
        }
    }
}

/// Identifier handed out by [`CallbackRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Callback<T> =
    Arc<dyn Fn(CancellationToken, ReloadOutcome<T>) -> BoxFuture<'static, ()> + Send + Sync>;

struct Subscriber<T> {
    id: SubscriberId,
    name: Option<String>,
    callback: Callback<T>,
}

impl<T> Subscriber<T> {
    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", name, self.id),
            None => self.id.to_string(),
        }
    }
}

#[derive(Default)]
struct DispatchCounters {
    active: AtomicUsize,
    total: AtomicU64,
    timed_out: AtomicU64,
    skipped: AtomicU64,
    panicked: AtomicU64,
    abandoned: AtomicU64,
}

/// Decrements the active count when the callback task itself ends, abandoned or not.
struct ActiveGuard(Arc<DispatchCounters>);

impl ActiveGuard {
    fn enter(counters: Arc<DispatchCounters>) -> Self {
        counters.active.fetch_add(1, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counters describing every dispatch the registry has performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Callbacks running right now.
    pub active: usize,
    /// Callbacks started since creation.
    pub total: u64,
    /// Callbacks that exceeded the timeout.
    pub timed_out: u64,
    /// Subscribers skipped because no slot was free.
    pub skipped: u64,
    /// Callbacks that panicked.
    pub panicked: u64,
    /// Callbacks still running after the grace period, left to finish on their own.
    pub abandoned: u64,
}

/// Summary of one call to [`CallbackRegistry::execute`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that ran to completion before their timeout.
    pub completed: usize,
    /// Callbacks that exceeded the timeout.
    pub timed_out: usize,
    /// Callbacks that panicked before their timeout.
    pub panicked: usize,
    /// Subscribers skipped because no slot was free.
    pub skipped: usize,
    /// Subscribers not started, or interrupted, because the parent token was cancelled.
    pub cancelled: usize,
}

impl DispatchReport {
    /// Subscribers whose callback was actually invoked.
    pub fn invoked(&self) -> usize {
        self.completed + self.timed_out + self.panicked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackStatus {
    Completed,
    Panicked,
    TimedOut,
    Cancelled,
    NotStarted,
}

struct RegistryInner<T> {
    subscribers: RwLock<Vec<Arc<Subscriber<T>>>>,
    next_id: AtomicU64,
    slots: Arc<Semaphore>,
    max_workers: usize,
    timeout: Duration,
    grace_period: Duration,
    counters: Arc<DispatchCounters>,
}

/// Registry of configuration change subscribers with bounded, cancellable dispatch.
///
/// # Examples
///
/// ```rust,no_run
/// use config_hotreload::notify::{CallbackRegistry, ReloadOutcome};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let registry: CallbackRegistry<String> = CallbackRegistry::default();
///
/// registry
///     .register_named("printer", |_token, outcome: ReloadOutcome<String>| async move {
///         if let Some(config) = outcome.config() {
///             println!("new config: {}", config);
///         }
///     })
///     .await;
///
/// let token = CancellationToken::new();
/// registry
///     .execute(&token, ReloadOutcome::Reloaded(Arc::new("v2".to_string())))
///     .await;
/// # }
/// ```
pub struct CallbackRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T> CallbackRegistry<T>
where
    T: Send + Sync + 'static,
{
    /// Create a registry running at most `max_workers` callbacks at once.
    ///
    /// Each callback may run for `timeout` before its token is cancelled; the
    /// dispatcher then waits up to `grace_period` more before moving on.
    /// A `max_workers` of zero is treated as one.
    pub fn new(max_workers: usize, timeout: Duration, grace_period: Duration) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            inner: Arc::new(RegistryInner {
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                slots: Arc::new(Semaphore::new(max_workers)),
                max_workers,
                timeout,
                grace_period,
                counters: Arc::new(DispatchCounters::default()),
            }),
        }
    }

    /// Register an anonymous subscriber.
    pub async fn register<F, Fut>(&self, callback: F) -> SubscriberId
    where
        F: Fn(CancellationToken, ReloadOutcome<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert(None, callback).await
    }

    /// Register a subscriber with a name used in diagnostics.
    pub async fn register_named<F, Fut>(&self, name: impl Into<String>, callback: F) -> SubscriberId
    where
        F: Fn(CancellationToken, ReloadOutcome<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.insert(Some(name.into()), callback).await
    }

    async fn insert<F, Fut>(&self, name: Option<String>, callback: F) -> SubscriberId
    where
        F: Fn(CancellationToken, ReloadOutcome<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let callback: Callback<T> = Arc::new(move |token, outcome| callback(token, outcome).boxed());
        let subscriber = Arc::new(Subscriber { id, name, callback });

        debug!(subscriber = %subscriber.label(), "registered subscriber");
        self.inner.subscribers.write().await.push(subscriber);
        id
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.inner.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }

    /// Number of registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }

    /// Ids and names of registered subscribers, in registration order.
    pub async fn subscribers(&self) -> Vec<(SubscriberId, Option<String>)> {
        self.inner
            .subscribers
            .read()
            .await
            .iter()
            .map(|s| (s.id, s.name.clone()))
            .collect()
    }

    /// Notify every subscriber of `outcome`.
    ///
    /// The subscriber list is copied before any callback runs, so registration
    /// never waits on a slow callback. Returns once every started callback has
    /// completed, or has been given its timeout plus grace period.
    pub async fn execute(&self, parent: &CancellationToken, outcome: ReloadOutcome<T>) -> DispatchReport {
        let subscribers: Vec<Arc<Subscriber<T>>> = self.inner.subscribers.read().await.clone();
        let mut report = DispatchReport::default();
        let mut running = JoinSet::new();

        for subscriber in subscribers {
            if parent.is_cancelled() {
                debug!(subscriber = %subscriber.label(), "dispatch cancelled before subscriber started");
                report.cancelled += 1;
                continue;
            }

            let permit = match Arc::clone(&self.inner.slots).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(
                        subscriber = %subscriber.label(),
                        max_workers = self.inner.max_workers,
                        "no free dispatch slot, skipping subscriber"
                    );
                    self.inner.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    report.skipped += 1;
                    continue;
                }
            };

            running.spawn(supervise(
                Arc::clone(&self.inner),
                subscriber,
                parent.clone(),
                outcome.clone(),
                permit,
            ));
        }

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(CallbackStatus::Completed) => report.completed += 1,
                Ok(CallbackStatus::Panicked) => report.panicked += 1,
                Ok(CallbackStatus::TimedOut) => report.timed_out += 1,
                Ok(CallbackStatus::Cancelled | CallbackStatus::NotStarted) => report.cancelled += 1,
                Err(e) => error!(error = %e, "dispatch supervisor failed"),
            }
        }

        debug!(
            completed = report.completed,
            timed_out = report.timed_out,
            panicked = report.panicked,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "dispatch finished"
        );
        report
    }

    /// Snapshot of the dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        let counters = &self.inner.counters;
        DispatchStats {
            active: counters.active.load(Ordering::SeqCst),
            total: counters.total.load(Ordering::Relaxed),
            timed_out: counters.timed_out.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            panicked: counters.panicked.load(Ordering::Relaxed),
            abandoned: counters.abandoned.load(Ordering::Relaxed),
        }
    }

    /// Maximum number of callbacks running at once.
    pub fn max_workers(&self) -> usize {
        self.inner.max_workers
    }

    /// Per-callback timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Time allowed for a late completion after a timeout or cancellation.
    pub fn grace_period(&self) -> Duration {
        self.inner.grace_period
    }
}

/// Run one callback and race it against its timeout and the parent token.
///
/// The slot permit travels with the callback task, so a callback abandoned
/// after the grace period keeps its slot until it actually returns.
async fn supervise<T>(
    inner: Arc<RegistryInner<T>>,
    subscriber: Arc<Subscriber<T>>,
    parent: CancellationToken,
    outcome: ReloadOutcome<T>,
    permit: OwnedSemaphorePermit,
) -> CallbackStatus
where
    T: Send + Sync + 'static,
{
    if parent.is_cancelled() {
        return CallbackStatus::NotStarted;
    }

    let active = ActiveGuard::enter(Arc::clone(&inner.counters));
    inner.counters.total.fetch_add(1, Ordering::Relaxed);

    let token = parent.child_token();
    let callback = Arc::clone(&subscriber.callback);
    let callback_token = token.clone();
    let mut task = tokio::spawn(async move {
        let _slot = (permit, active);
        callback(callback_token, outcome).await
    });

    let status = tokio::select! {
        joined = &mut task => return settle(&inner, &subscriber, joined),
        _ = tokio::time::sleep(inner.timeout) => {
            token.cancel();
            inner.counters.timed_out.fetch_add(1, Ordering::Relaxed);
            warn!(
                subscriber = %subscriber.label(),
                timeout_ms = inner.timeout.as_millis() as u64,
                "subscriber callback timed out"
            );
            CallbackStatus::TimedOut
        }
        _ = parent.cancelled() => {
            debug!(subscriber = %subscriber.label(), "dispatch cancelled while subscriber was running");
            CallbackStatus::Cancelled
        }
    };

    match tokio::time::timeout(inner.grace_period, &mut task).await {
        Ok(joined) => {
            settle(&inner, &subscriber, joined);
        }
        Err(_) => {
            // Dropping the handle detaches the task; it keeps its cancelled token and its slot.
            inner.counters.abandoned.fetch_add(1, Ordering::Relaxed);
            warn!(
                subscriber = %subscriber.label(),
                grace_ms = inner.grace_period.as_millis() as u64,
                "subscriber ignored cancellation, abandoning callback"
            );
        }
    }
    status
}

fn settle<T>(
    inner: &RegistryInner<T>,
    subscriber: &Subscriber<T>,
    joined: Result<(), JoinError>,
) -> CallbackStatus {
    match joined {
        Ok(()) => {
            debug!(subscriber = %subscriber.label(), "subscriber callback completed");
            CallbackStatus::Completed
        }
        Err(e) if e.is_panic() => {
            inner.counters.panicked.fetch_add(1, Ordering::Relaxed);
            error!(subscriber = %subscriber.label(), "subscriber callback panicked");
            CallbackStatus::Panicked
        }
        Err(e) => {
            warn!(subscriber = %subscriber.label(), error = %e, "subscriber callback was aborted");
            CallbackStatus::Cancelled
        }
    }
}

impl<T> Default for CallbackRegistry<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS, DEFAULT_CALLBACK_TIMEOUT, DEFAULT_GRACE_PERIOD)
    }
}

impl<T> Clone for CallbackRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    fn reloaded(value: u32) -> ReloadOutcome<u32> {
        ReloadOutcome::Reloaded(Arc::new(value))
    }

    #[tokio::test]
    async fn test_register_and_count() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::default();
        assert_eq!(registry.subscriber_count().await, 0);

        let first = registry.register(|_, _| async {}).await;
        let second = registry.register_named("metrics", |_, _| async {}).await;
        assert_ne!(first, second);
        assert_eq!(registry.subscriber_count().await, 2);

        let listed = registry.subscribers().await;
        assert_eq!(listed[1], (second, Some("metrics".to_string())));

        assert!(registry.unregister(first).await);
        assert!(!registry.unregister(first).await);
        assert_eq!(registry.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_fan_out_delivers_outcome() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::default();
        let sum = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let sum = Arc::clone(&sum);
            registry
                .register(move |_, outcome: ReloadOutcome<u32>| {
                    let sum = Arc::clone(&sum);
                    async move {
                        if let Some(config) = outcome.config() {
                            sum.fetch_add(**config as usize, Ordering::SeqCst);
                        }
                    }
                })
                .await;
        }

        let report = registry.execute(&CancellationToken::new(), reloaded(7)).await;
        assert_eq!(report.completed, 3);
        assert_eq!(sum.load(Ordering::SeqCst), 21);

        let stats = registry.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn test_error_outcome_carries_no_config() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::default();
        let saw_error = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&saw_error);
        registry
            .register(move |_, outcome: ReloadOutcome<u32>| {
                let flag = Arc::clone(&flag);
                async move {
                    assert!(outcome.config().is_none());
                    flag.store(outcome.error().is_some(), Ordering::SeqCst);
                }
            })
            .await;

        let failed = ReloadOutcome::Failed(Arc::new(ConfigError::ParseError("bad".into())));
        registry.execute(&CancellationToken::new(), failed).await;
        assert!(saw_error.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_concurrency_bound_skips_extra_subscribers() {
        let registry: CallbackRegistry<u32> =
            CallbackRegistry::new(2, Duration::from_secs(5), Duration::from_millis(50));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let (running, peak, ran) = (Arc::clone(&running), Arc::clone(&peak), Arc::clone(&ran));
            registry
                .register(move |_, _| {
                    let (running, peak, ran) =
                        (Arc::clone(&running), Arc::clone(&peak), Arc::clone(&ran));
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        ran.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await;
        }

        let report = registry.execute(&CancellationToken::new(), reloaded(1)).await;
        assert_eq!(report.completed, 2);
        assert_eq!(report.skipped, 1);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(registry.stats().skipped, 1);

        // Slots are released once the dispatch returns.
        let report = registry.execute(&CancellationToken::new(), reloaded(2)).await;
        assert_eq!(report.invoked(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_isolated() {
        let registry: CallbackRegistry<u32> =
            CallbackRegistry::new(4, Duration::from_millis(100), Duration::from_millis(20));
        let fast = Arc::new(AtomicUsize::new(0));

        registry
            .register_named("stuck", |_, _| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            })
            .await;
        for _ in 0..2 {
            let fast = Arc::clone(&fast);
            registry
                .register(move |_, _| {
                    let fast = Arc::clone(&fast);
                    async move {
                        fast.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await;
        }

        let started = Instant::now();
        let report = registry.execute(&CancellationToken::new(), reloaded(1)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(report.completed, 2);
        assert_eq!(report.timed_out, 1);
        assert_eq!(fast.load(Ordering::SeqCst), 2);

        let stats = registry.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.abandoned, 1);
        // The stuck callback is still running and still holds its slot.
        assert_eq!(stats.active, 1);
    }

    #[tokio::test]
    async fn test_abandoned_callback_keeps_its_slot() {
        let registry: CallbackRegistry<u32> =
            CallbackRegistry::new(1, Duration::from_millis(20), Duration::from_millis(10));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (counter, high) = (Arc::clone(&running), Arc::clone(&peak));
        registry
            .register_named("hung", move |_, _| {
                let (counter, high) = (Arc::clone(&counter), Arc::clone(&high));
                async move {
                    let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    high.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    counter.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;

        let first = registry.execute(&CancellationToken::new(), reloaded(1)).await;
        assert_eq!(first.timed_out, 1);

        for value in 2..=5 {
            let report = registry.execute(&CancellationToken::new(), reloaded(value)).await;
            assert_eq!(report.skipped, 1);
            assert_eq!(report.invoked(), 0);
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(running.load(Ordering::SeqCst), 1);

        let stats = registry.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.skipped, 4);
        assert_eq!(stats.active, 1);
    }

    #[tokio::test]
    async fn test_slot_returns_when_abandoned_callback_finishes() {
        let registry: CallbackRegistry<u32> =
            CallbackRegistry::new(1, Duration::from_millis(20), Duration::from_millis(10));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        registry
            .register(move |_, _| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(150)).await;
                }
            })
            .await;

        registry.execute(&CancellationToken::new(), reloaded(1)).await;
        assert_eq!(registry.stats().abandoned, 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(registry.stats().active, 0);

        let report = registry.execute(&CancellationToken::new(), reloaded(2)).await;
        assert_eq!(report.skipped, 0);
        assert_eq!(report.timed_out, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cooperative_callback_finishes_within_grace() {
        let registry: CallbackRegistry<u32> =
            CallbackRegistry::new(1, Duration::from_millis(50), Duration::from_millis(500));
        let observed = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&observed);
        registry
            .register(move |token: CancellationToken, _| {
                let flag = Arc::clone(&flag);
                async move {
                    token.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                }
            })
            .await;

        let report = registry.execute(&CancellationToken::new(), reloaded(1)).await;
        assert_eq!(report.timed_out, 1);
        assert!(observed.load(Ordering::SeqCst));
        assert_eq!(registry.stats().abandoned, 0);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::default();
        let survivors = Arc::new(AtomicUsize::new(0));

        registry
            .register_named("faulty", |_, _| async {
                panic!("subscriber blew up");
            })
            .await;
        for _ in 0..2 {
            let survivors = Arc::clone(&survivors);
            registry
                .register(move |_, _| {
                    let survivors = Arc::clone(&survivors);
                    async move {
                        survivors.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .await;
        }

        let report = registry.execute(&CancellationToken::new(), reloaded(1)).await;
        assert_eq!(report.panicked, 1);
        assert_eq!(report.completed, 2);
        assert_eq!(survivors.load(Ordering::SeqCst), 2);
        assert_eq!(registry.stats().panicked, 1);
    }

    #[tokio::test]
    async fn test_cancelled_parent_starts_nothing() {
        let registry: CallbackRegistry<u32> = CallbackRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        registry
            .register(move |_, _| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        let parent = CancellationToken::new();
        parent.cancel();
        let report = registry.execute(&parent, reloaded(1)).await;

        assert_eq!(report.cancelled, 1);
        assert_eq!(report.invoked(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.stats().total, 0);
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_running_callback() {
        let registry: CallbackRegistry<u32> =
            CallbackRegistry::new(2, Duration::from_secs(30), Duration::from_millis(500));
        let stopped = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&stopped);
        registry
            .register(move |token: CancellationToken, _| {
                let flag = Arc::clone(&flag);
                async move {
                    token.cancelled().await;
                    flag.store(true, Ordering::SeqCst);
                }
            })
            .await;

        let parent = CancellationToken::new();
        let canceller = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let report = registry.execute(&parent, reloaded(1)).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.cancelled, 1);
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(registry.stats().timed_out, 0);
    }
}
