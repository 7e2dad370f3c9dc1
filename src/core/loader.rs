//! Turning raw configuration bytes into a typed configuration.

use crate::error::{ConfigError, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Parses the raw contents of the watched file.
///
/// Implemented for any `Fn(&[u8]) -> Result<T>`, so a closure is usually enough.
/// Loaders should be pure: the same bytes must always give the same result.
///
/// # Examples
///
/// ```rust
/// use config_hotreload::core::Loader;
/// use config_hotreload::error::{ConfigError, Result};
///
/// let loader = |raw: &[u8]| -> Result<u16> {
///     std::str::from_utf8(raw)
///         .ok()
///         .and_then(|s| s.trim().parse().ok())
///         .ok_or_else(|| ConfigError::ParseError("expected a port number".into()))
/// };
///
/// assert_eq!(loader.load(b"8080\n").unwrap(), 8080);
/// assert!(loader.load(b"eighty").is_err());
/// ```
pub trait Loader<T>: Send + Sync {
    /// Parse `raw` into a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be parsed or deserialized.
    fn load(&self, raw: &[u8]) -> Result<T>;
}

impl<T, F> Loader<T> for F
where
    F: Fn(&[u8]) -> Result<T> + Send + Sync,
{
    fn load(&self, raw: &[u8]) -> Result<T> {
        self(raw)
    }
}

/// File formats understood by [`FormatLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
    /// `.json`
    Json,
}

impl Format {
    /// Detect the format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is missing or unsupported.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ConfigError::LoadError(format!(
                    "Unable to determine file format for: {}",
                    path.display()
                ))
            })?;

        match extension {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::LoadError(format!(
                "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
                extension
            ))),
        }
    }

    fn file_format(self) -> config::FileFormat {
        match self {
            Self::Yaml => config::FileFormat::Yaml,
            Self::Toml => config::FileFormat::Toml,
            Self::Json => config::FileFormat::Json,
        }
    }
}

/// Loader that decodes YAML, TOML or JSON into any deserializable type.
#[derive(Debug, Clone, Copy)]
pub struct FormatLoader {
    format: Format,
}

impl FormatLoader {
    /// Create a loader for a fixed format.
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    /// Create a loader for the format implied by `path`'s extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is missing or unsupported.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Format::from_path(path).map(Self::new)
    }

    /// The format this loader decodes.
    pub fn format(&self) -> Format {
        self.format
    }
}

impl<T> Loader<T> for FormatLoader
where
    T: DeserializeOwned,
{
    fn load(&self, raw: &[u8]) -> Result<T> {
        let text = std::str::from_utf8(raw).map_err(|e| {
            ConfigError::ParseError(format!("Configuration is not valid UTF-8: {}", e))
        })?;

        let config = config::Config::builder()
            .add_source(config::File::from_str(text, self.format.file_format()))
            .build()
            .map_err(|e| {
                ConfigError::ParseError(format!("Failed to parse {:?} configuration: {}", self.format, e))
            })?;

        config.try_deserialize::<T>().map_err(|e| {
            ConfigError::DeserializationError(format!("Failed to deserialize configuration: {}", e))
        })
    }
}
