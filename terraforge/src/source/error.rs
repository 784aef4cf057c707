//! Tile source error types.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while constructing a tile source or resolving a tile.
///
/// Resolution errors never leave the fetch worker pool; they only decide
/// whether a task is retried or surfaces as an unavailable placeholder.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// URL template is missing a placeholder or is otherwise unusable.
    #[error("Invalid tile URL template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// The HTTP client could not be constructed.
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    /// Connection-level failure (DNS, refused, reset, TLS).
    #[error("Request to {url} failed: {message}")]
    Connect { url: String, message: String },

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The fetch did not complete in time.
    #[error("Tile fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Response body was not a decodable image.
    #[error("Failed to decode tile image: {0}")]
    Decode(String),

    /// Reading or writing the persistent store failed.
    #[error("Tile store I/O error: {0}")]
    Store(String),

    /// Store-only mode and the store has no such tile.
    #[error("Tile {0} is not in the offline store")]
    NotStored(String),

    /// A blocking image task panicked or was cancelled.
    #[error("Image processing task failed: {0}")]
    Task(String),

    /// Tile index lies outside the pyramid at its zoom level.
    #[error("Tile {0} is outside the world")]
    OutOfWorld(String),
}

impl SourceError {
    /// Returns true if retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, server-side errors (5xx), rate limiting
    /// (429) and store I/O errors are transient. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect { .. } | Self::Store(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
