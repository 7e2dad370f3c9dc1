//! Configuration validation support.

use crate::error::ValidationError;

/// Checks semantic constraints on a loaded configuration.
///
/// Implemented for any `Fn(&T) -> Result<(), ValidationError>`. Validation runs
/// after every reload, including reloads served from the cache.
pub trait Validator<T>: Send + Sync {
    /// Validate `config`.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` describing what is wrong.
    fn validate(&self, config: &T) -> Result<(), ValidationError>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(&T) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, config: &T) -> Result<(), ValidationError> {
        self(config)
    }
}

/// Trait for configuration validation.
///
/// Implement this trait on your configuration types to enable automatic validation
/// before updates are applied.
///
/// # Examples
///
/// ```rust
/// use config_hotreload::core::Validate;
/// use config_hotreload::error::ValidationError;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize, Clone)]
/// struct ScraperConfig {
///     concurrency: usize,
///     request_timeout_secs: u64,
/// }
///
/// impl Validate for ScraperConfig {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.concurrency == 0 {
///             return Err(ValidationError::invalid_field(
///                 "concurrency",
///                 "must be greater than 0"
///             ));
///         }
///
///         if self.request_timeout_secs > 300 {
///             return Err(ValidationError::invalid_field(
///                 "request_timeout_secs",
///                 "must be at most 300"
///             ));
///         }
///
///         Ok(())
///     }
/// }
/// ```
#[cfg(feature = "validation")]
pub trait Validate {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Adapts a [`Validate`] implementation to the [`Validator`] seam.
#[cfg(feature = "validation")]
pub(crate) struct SelfValidating;

#[cfg(feature = "validation")]
impl<T: Validate> Validator<T> for SelfValidating {
    fn validate(&self, config: &T) -> Result<(), ValidationError> {
        config.validate()
    }
}
