//! Logging setup.
//!
//! Installs a `tracing` subscriber with:
//!
//! - an `EnvFilter` built from `RUST_LOG` when set, otherwise from the
//!   configured level (applied to the `terraforge` targets)
//! - a stderr layer with local-time timestamps
//! - optionally, a daily rolling log file
//! - with the `profiling` feature, a Chrome trace written to
//!   `terraforge-trace.json`
//!
//! Call [`init_logging`] once at startup and keep the returned guard alive
//! until exit; dropping it flushes the file writer.

use std::path::PathBuf;

use thiserror::Error;
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// File name prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "terraforge.log";

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level or filter directive, e.g. `debug` or `terraforge::fetch=trace`.
    ///
    /// Default: info
    pub level: String,

    /// Directory for daily rolling log files. `None` logs to stderr only.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed.
    #[error("Failed to install log subscriber: {0}")]
    Init(String),
}

/// Keeps log writers alive. Drop at exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
    #[cfg(feature = "profiling")]
    _chrome: tracing_chrome::FlushGuard,
}

/// Builds the filter: `RUST_LOG` wins over the configured level.
pub fn build_filter(level: &str) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::builder().from_env_lossy()
    } else {
        EnvFilter::builder().parse_lossy(filter_directive(level))
    }
}

/// Expands a bare level into a directive for this crate's targets; full
/// directives pass through unchanged.
fn filter_directive(level: &str) -> String {
    let level = level.trim();
    let is_bare_level = matches!(
        level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    );
    if is_bare_level {
        format!("warn,terraforge={level}")
    } else {
        level.to_string()
    }
}

/// Installs the global subscriber.
///
/// Returns an error if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(false)
        .with_filter(build_filter(&config.level));

    let (file_layer, file_guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false)
                .with_filter(build_filter(&config.level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer);

    #[cfg(feature = "profiling")]
    {
        let (chrome_layer, chrome_guard) = tracing_chrome::ChromeLayerBuilder::new()
            .file("terraforge-trace.json")
            .include_args(true)
            .build();
        registry
            .with(chrome_layer)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))?;
        Ok(LoggingGuard {
            _file: file_guard,
            _chrome: chrome_guard,
        })
    }

    #[cfg(not(feature = "profiling"))]
    {
        registry.try_init().map_err(|e| LoggingError::Init(e.to_string()))?;
        Ok(LoggingGuard { _file: file_guard })
    }
}
