//! Error types for config-hotreload.

use std::fmt;

/// Result type alias for config-hotreload operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading, validating or watching configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to load configuration from the watched file.
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// Failed to parse the raw configuration bytes.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Failed to deserialize configuration into the target type.
    #[error("Failed to deserialize configuration: {0}")]
    DeserializationError(String),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// IO error occurred while stating or reading the watched file.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The poll loop could not be started or was lost.
    #[error("File watching error: {0}")]
    WatchError(String),

    /// Watcher settings are out of range.
    #[error("Invalid watcher settings: {0}")]
    InvalidSettings(String),

    /// `start()` was called on a watcher that is already running.
    #[error("Config watcher is already running")]
    AlreadyRunning,

    /// `start()` was called on a watcher that has been stopped.
    #[error("Config watcher has been stopped and cannot be restarted")]
    Stopped,

    /// Generic error for other cases.
    #[error("Configuration error: {0}")]
    Other(String),
}

/// Validation error for configuration validation.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}
