//! Built-in metrics for configuration reloads.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Reload attempts/success/failures
//! - Reload duration
//! - Validation failures
//! - Cache hits and misses
//! - Subscriber timeouts, skips and panics
//! - Active subscribers
//!
//! # Examples
//!
//! ```rust,no_run
//! use config_hotreload::prelude::*;
//! use opentelemetry::global;
//!
//! # fn example() -> Result<()> {
//! let meter = global::meter("my-app");
//!
//! let watcher = ConfigWatcher::<AppConfig>::builder("config.yaml")
//!     .with_detected_format()?
//!     .with_metrics(meter)
//!     .build()?;
//! # Ok(())
//! # }
//! # #[derive(serde::Deserialize, Clone)] struct AppConfig {}
//! ```

mod config_metrics;

pub use config_metrics::ConfigMetrics;
