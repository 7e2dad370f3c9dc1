//! Reload coordination: loading, validation and the watcher lifecycle.

mod builder;
mod config_watcher;
mod loader;
mod settings;
mod validation;

pub use builder::ConfigWatcherBuilder;
pub use config_watcher::{ConfigWatcher, WatcherState, WatcherStats};
pub use loader::{Format, FormatLoader, Loader};
pub use settings::WatcherSettings;
pub use validation::Validator;

#[cfg(feature = "validation")]
pub use validation::Validate;
