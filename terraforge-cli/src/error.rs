//! CLI error type.

use std::path::PathBuf;

use thiserror::Error;

use terraforge::config::ConfigError;
use terraforge::engine::EngineError;
use terraforge::logging::LoggingError;
use terraforge::source::SourceError;
use terraforge::viewport::ViewportError;

/// Errors reported to the user by the `terraforge` binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Viewport(#[from] ViewportError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("Failed to create Tokio runtime: {0}")]
    Runtime(String),

    #[error("Failed to render {path}: {message}")]
    Render { path: PathBuf, message: String },
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}
