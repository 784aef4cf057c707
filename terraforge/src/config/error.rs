//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("Failed to read config file {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    /// The file could not be written.
    #[error("Failed to write config file {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    /// A key holds a value of the wrong type or out of range.
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// A `section.key` name that does not exist.
    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),
}
