//! Error types for configuration operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML.
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A value fell outside its allowed range.
    #[error("parameter '{param}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Dotted parameter path.
        param: &'static str,
        /// The offending value.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },

    /// A value must be one of an enumerated set.
    #[error("parameter '{param}' value {value} must be one of {allowed}")]
    NotInSet {
        /// Dotted parameter path.
        param: &'static str,
        /// The offending value.
        value: u32,
        /// Human-readable allowed set.
        allowed: &'static str,
    },

    /// Two parameters are mutually inconsistent.
    #[error("inconsistent parameters: {0}")]
    Inconsistent(String),
}

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
