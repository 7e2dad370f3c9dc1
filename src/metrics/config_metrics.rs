//! Reload metrics tracking using OpenTelemetry.

use crate::notify::DispatchReport;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for reload operations.
///
/// Tracks reload attempts, success/failure rates, latencies, cache efficiency
/// and subscriber dispatch health using OpenTelemetry metrics.
///
/// # Examples
///
/// ```rust,no_run
/// use config_hotreload::metrics::ConfigMetrics;
/// use opentelemetry::global;
///
/// let meter = global::meter("config-hotreload");
/// let metrics = ConfigMetrics::new(meter);
///
/// // Track a reload operation
/// let timer = metrics.start_reload();
/// // ... perform reload ...
/// metrics.record_reload_success(timer);
/// ```
#[derive(Clone)]
pub struct ConfigMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    config_age_seconds: Gauge<i64>,
    validation_failures: Counter<u64>,
    cache_hits: Counter<u64>,
    cache_misses: Counter<u64>,
    subscriber_timeouts: Counter<u64>,
    subscriber_skips: Counter<u64>,
    subscriber_panics: Counter<u64>,
    active_subscribers: Gauge<i64>,
    last_update: Arc<parking_lot::Mutex<Instant>>,
}

impl ConfigMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        Self {
            reload_attempts: meter
                .u64_counter("config_hotreload.reload.attempts")
                .with_description("Total number of reload attempts")
                .build(),
            reload_success: meter
                .u64_counter("config_hotreload.reload.success")
                .with_description("Number of successful reloads")
                .build(),
            reload_failures: meter
                .u64_counter("config_hotreload.reload.failures")
                .with_description("Number of failed reloads")
                .build(),
            reload_duration: meter
                .f64_histogram("config_hotreload.reload.duration")
                .with_description("Duration of reload operations in seconds")
                .with_unit("s")
                .build(),
            config_age_seconds: meter
                .i64_gauge("config_hotreload.age")
                .with_description("Time since the last successful reload in seconds")
                .with_unit("s")
                .build(),
            validation_failures: meter
                .u64_counter("config_hotreload.validation.failures")
                .with_description("Number of validation failures")
                .build(),
            cache_hits: meter
                .u64_counter("config_hotreload.cache.hits")
                .with_description("Reloads served from the parse cache")
                .build(),
            cache_misses: meter
                .u64_counter("config_hotreload.cache.misses")
                .with_description("Reloads that had to read and parse the file")
                .build(),
            subscriber_timeouts: meter
                .u64_counter("config_hotreload.subscribers.timeouts")
                .with_description("Subscriber callbacks that exceeded their timeout")
                .build(),
            subscriber_skips: meter
                .u64_counter("config_hotreload.subscribers.skipped")
                .with_description("Subscribers skipped because no dispatch slot was free")
                .build(),
            subscriber_panics: meter
                .u64_counter("config_hotreload.subscribers.panics")
                .with_description("Subscriber callbacks that panicked")
                .build(),
            active_subscribers: meter
                .i64_gauge("config_hotreload.subscribers.active")
                .with_description("Number of registered subscribers")
                .build(),
            last_update: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Start a reload operation timer.
    ///
    /// Returns an `Instant` that should be passed to `record_reload_success` or
    /// `record_reload_failure` when the operation completes.
    pub fn start_reload(&self) -> Instant {
        self.reload_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a successful reload operation.
    pub fn record_reload_success(&self, start: Instant) {
        self.reload_success.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
        *self.last_update.lock() = Instant::now();
    }

    /// Record a failed reload operation.
    pub fn record_reload_failure(&self, start: Instant) {
        self.reload_failures.add(1, &[]);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &[]);
    }

    /// Record a validation failure.
    pub fn record_validation_failure(&self) {
        self.validation_failures.add(1, &[]);
    }

    /// Record whether a reload was served from the cache.
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.add(1, &[]);
        } else {
            self.cache_misses.add(1, &[]);
        }
    }

    /// Record the outcome of one subscriber dispatch.
    pub fn record_dispatch(&self, report: &DispatchReport) {
        self.subscriber_timeouts.add(report.timed_out as u64, &[]);
        self.subscriber_skips.add(report.skipped as u64, &[]);
        self.subscriber_panics.add(report.panicked as u64, &[]);
    }

    /// Update the number of registered subscribers.
    pub fn update_subscriber_count(&self, count: i64) {
        self.active_subscribers.record(count, &[]);
    }

    /// Update the configuration age metric.
    ///
    /// This should be called periodically to track how stale the configuration is.
    pub fn update_config_age(&self) {
        let age_secs = self.last_update.lock().elapsed().as_secs() as i64;
        self.config_age_seconds.record(age_secs, &[]);
    }
}
