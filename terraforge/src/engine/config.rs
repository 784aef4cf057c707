//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::fetch::{RetryPolicy, DEFAULT_WORKER_COUNT};
use crate::precache::PreCacheConfig;
use crate::source::{DEFAULT_MAX_ZOOM, DEFAULT_TILE_TEMPLATE};
use crate::tile::DEFAULT_TILE_SIZE;

/// Default per-tile fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Settings for a [`TileEngine`](super::TileEngine).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Base layer URL template with `{z}`, `{x}` and `{y}` placeholders.
    pub url_template: String,

    /// Optional overlay layer template, composited over the base layer.
    pub overlay_template: Option<String>,

    /// Tile edge length in pixels.
    ///
    /// Default: 256
    pub tile_size: u32,

    /// Highest zoom level served by the source.
    ///
    /// Default: 19
    pub max_zoom: u8,

    /// Maximum decoded tiles kept in memory.
    ///
    /// Default: 10,000
    pub cache_capacity: usize,

    /// Number of fetch workers.
    ///
    /// Default: 25
    pub workers: usize,

    /// Timeout for producing one tile, store and network included.
    ///
    /// Default: 10 seconds
    pub fetch_timeout: Duration,

    /// Retry policy for transient fetch failures.
    pub retry: RetryPolicy,

    /// Directory of the persistent tile store. `None` disables the store.
    pub store_dir: Option<PathBuf>,

    /// Serve tiles from the store only, never the network.
    pub store_only: bool,

    /// Pre-cache ring settings.
    pub precache: PreCacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_TILE_TEMPLATE.to_string(),
            overlay_template: None,
            tile_size: DEFAULT_TILE_SIZE,
            max_zoom: DEFAULT_MAX_ZOOM,
            cache_capacity: DEFAULT_MAX_ENTRIES,
            workers: DEFAULT_WORKER_COUNT,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            store_dir: None,
            store_only: false,
            precache: PreCacheConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    pub fn with_overlay_template(mut self, template: Option<String>) -> Self {
        self.overlay_template = template;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_max_zoom(mut self, max_zoom: u8) -> Self {
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the worker count. Zero is raised to one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_store_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.store_dir = dir;
        self
    }

    pub fn with_store_only(mut self, store_only: bool) -> Self {
        self.store_only = store_only;
        self
    }

    pub fn with_precache(mut self, precache: PreCacheConfig) -> Self {
        self.precache = precache;
        self
    }
}
