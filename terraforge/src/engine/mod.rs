//! Background tile engine.
//!
//! `TileEngine` owns everything that runs off the render thread: the shared
//! cache, the fetch queue, the worker pool and the pre-cache scheduler. It
//! hands the viewport a [`ViewportBackend`] holding the other ends.
//!
//! # Runtime
//!
//! The engine runs on a Tokio runtime. [`TileEngine::start`] creates and owns
//! a multi-thread runtime, which suits hosts without one (GUI toolkits,
//! sync CLI commands). [`TileEngine::with_handle`] spawns onto the caller's
//! runtime instead.
//!
//! # Example
//!
//! ```ignore
//! use terraforge::engine::{EngineConfig, TileEngine};
//!
//! let mut engine = TileEngine::start(EngineConfig::default())?;
//! let backend = engine.take_backend().expect("backend");
//! // hand `backend` to a Viewport ...
//! engine.shutdown();
//! ```

mod config;

pub use config::{EngineConfig, DEFAULT_FETCH_TIMEOUT_SECS};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::{CacheStats, TileCache};
use crate::fetch::{FetchContext, FetchQueue, FetchStatsSnapshot, FetchWorkerPool};
use crate::precache::{PreCacheCenter, PreCacheScheduler};
use crate::source::{
    DiskTileStore, HttpClient, ReqwestClient, SourceError, SourceHandle, TileResolver, TileSource,
};
use crate::viewport::ViewportBackend;

/// How long an owned runtime waits for blocking work on shutdown.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that can occur while starting the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The tile source or HTTP client could not be built.
    #[error("Failed to configure tile source: {0}")]
    Source(#[from] SourceError),

    /// The Tokio runtime could not be created.
    #[error("Failed to create Tokio runtime: {0}")]
    RuntimeCreation(String),

    /// The viewport backend was already handed out.
    #[error("Engine backend already taken")]
    BackendTaken,
}

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStats {
    pub cache: CacheStats,
    pub fetch: FetchStatsSnapshot,
    /// Tasks waiting in the queue.
    pub queued: usize,
}

/// Cache, fetch workers and pre-cache scheduler for one map widget.
pub struct TileEngine {
    cache: Arc<TileCache>,
    queue: Arc<FetchQueue>,
    source: Arc<SourceHandle>,
    resolver: Arc<TileResolver>,
    pool: Option<FetchWorkerPool>,
    precache: Option<PreCacheScheduler>,
    backend: Option<ViewportBackend>,
    handle: Handle,

    /// Owned runtime when created via [`TileEngine::start`]. Dropped last.
    runtime: Option<Runtime>,
}

impl TileEngine {
    /// Starts the engine on a dedicated multi-thread runtime.
    pub fn start(config: EngineConfig) -> Result<Self, EngineError> {
        let http = Arc::new(ReqwestClient::with_timeout(config.fetch_timeout)?);
        Self::start_with_client(config, None, http)
    }

    /// Starts the engine on the caller's runtime.
    pub fn with_handle(config: EngineConfig, handle: Handle) -> Result<Self, EngineError> {
        let http = Arc::new(ReqwestClient::with_timeout(config.fetch_timeout)?);
        Self::start_with_client(config, Some(handle), http)
    }

    /// Starts the engine with a custom HTTP client.
    ///
    /// With `handle` set, tasks are spawned onto that runtime; otherwise the
    /// engine creates and owns one.
    pub fn start_with_client(
        config: EngineConfig,
        handle: Option<Handle>,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, EngineError> {
        let source = TileSource::new(&config.url_template, config.tile_size, config.max_zoom)?
            .with_overlay(config.overlay_template.as_deref())?;

        let (runtime, handle) = match handle {
            Some(handle) => (None, handle),
            None => {
                let runtime = Builder::new_multi_thread()
                    .thread_name("terraforge-engine")
                    .enable_all()
                    .build()
                    .map_err(|e| EngineError::RuntimeCreation(e.to_string()))?;
                let handle = runtime.handle().clone();
                (Some(runtime), handle)
            }
        };

        let mut resolver = TileResolver::new(http)
            .with_timeout(config.fetch_timeout)
            .with_store_only(config.store_only);
        if let Some(dir) = &config.store_dir {
            resolver = resolver.with_store(Arc::new(DiskTileStore::new(dir)));
        }

        let cache = Arc::new(TileCache::new(config.cache_capacity));
        let queue = Arc::new(FetchQueue::new());
        let source = Arc::new(SourceHandle::new(source));
        let resolver = Arc::new(resolver);
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let pool = FetchWorkerPool::start(
            &handle,
            config.workers,
            FetchContext {
                queue: Arc::clone(&queue),
                cache: Arc::clone(&cache),
                source: Arc::clone(&source),
                resolver: Arc::clone(&resolver),
                retry: config.retry.clone(),
                results: results_tx,
            },
        );
        let precache = PreCacheScheduler::start(
            &handle,
            config.precache.clone(),
            Arc::clone(&queue),
            Arc::clone(&cache),
        );

        info!(
            template = %config.url_template,
            overlay = config.overlay_template.as_deref().unwrap_or("none"),
            workers = config.workers,
            cache_capacity = config.cache_capacity,
            store = config.store_dir.as_ref().map(|d| d.display().to_string()).unwrap_or_default(),
            store_only = config.store_only,
            owned_runtime = runtime.is_some(),
            "Tile engine started"
        );

        let backend = ViewportBackend {
            cache: Arc::clone(&cache),
            queue: Arc::clone(&queue),
            source: Arc::clone(&source),
            results: results_rx,
        };

        Ok(Self {
            cache,
            queue,
            source,
            resolver,
            pool: Some(pool),
            precache: Some(precache),
            backend: Some(backend),
            handle,
            runtime,
        })
    }

    /// Takes the viewport's side of the engine. Returns `None` after the
    /// first call.
    pub fn take_backend(&mut self) -> Option<ViewportBackend> {
        self.backend.take()
    }

    /// Moves the pre-cache center of interest.
    pub fn set_precache_center(&self, center: PreCacheCenter) {
        if let Some(precache) = &self.precache {
            precache.set_center(center);
        }
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<FetchQueue> {
        &self.queue
    }

    pub fn source(&self) -> &Arc<SourceHandle> {
        &self.source
    }

    pub fn resolver(&self) -> &Arc<TileResolver> {
        &self.resolver
    }

    /// Handle of the runtime the engine's tasks run on.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cache: self.cache.stats(),
            fetch: self
                .pool
                .as_ref()
                .map(FetchWorkerPool::stats)
                .unwrap_or_default(),
            queued: self.queue.len(),
        }
    }

    /// Stops all background tasks.
    ///
    /// With an owned runtime this waits for the workers to exit, unless it is
    /// called from inside another Tokio runtime, where blocking would panic;
    /// the tasks are then only signalled and the runtime is shut down in the
    /// background. On a caller's runtime it only signals them; use
    /// [`Self::shutdown_async`] from async code to wait.
    pub fn shutdown(mut self) {
        let pool = self.pool.take();
        let precache = self.precache.take();

        match self.runtime.take() {
            Some(runtime) if Handle::try_current().is_err() => {
                runtime.block_on(async {
                    if let Some(pool) = pool {
                        pool.shutdown().await;
                    }
                    if let Some(precache) = precache {
                        precache.shutdown().await;
                    }
                });
                runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
            }
            runtime => {
                if let Some(pool) = &pool {
                    pool.cancel();
                }
                if let Some(precache) = &precache {
                    precache.cancel();
                }
                if let Some(runtime) = runtime {
                    warn!("Engine shut down from async context, not waiting for workers");
                    runtime.shutdown_background();
                }
            }
        }
        info!("Tile engine stopped");
    }

    /// Stops all background tasks and waits for them to exit.
    ///
    /// Must not be called on an engine that owns its runtime.
    pub async fn shutdown_async(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }
        if let Some(precache) = self.precache.take() {
            precache.shutdown().await;
        }
        info!("Tile engine stopped");
    }
}

impl Drop for TileEngine {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            pool.cancel();
        }
        if let Some(precache) = &self.precache {
            precache.cancel();
        }
        // Dropping an owned runtime inside another runtime panics.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TileEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileEngine")
            .field("source", &self.source.current().id())
            .field("cache_entries", &self.cache.len())
            .field("queued", &self.queue.len())
            .field("owned_runtime", &self.runtime.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::LatLon;
    use crate::source::MockHttpClient;
    use crate::tile::png_bytes;
    use crate::viewport::Viewport;
    use bytes::Bytes;
    use image::Rgba;

    fn config() -> EngineConfig {
        EngineConfig::default()
            .with_url_template("https://tiles.test/{z}/{x}/{y}.png")
            .with_workers(4)
    }

    fn green() -> Arc<MockHttpClient> {
        Arc::new(MockHttpClient::always(Ok(Bytes::from(png_bytes(
            256,
            Rgba([0, 200, 0, 255]),
        )))))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_engine_loads_viewport_tiles() {
        let mut engine =
            TileEngine::start_with_client(config(), Some(Handle::current()), green()).unwrap();
        let backend = engine.take_backend().unwrap();
        assert!(engine.take_backend().is_none());

        let mut viewport = Viewport::new(512, 512, LatLon::new(0.0, 0.0), 10.0, backend);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !viewport.is_settled() && tokio::time::Instant::now() < deadline {
            viewport.apply_results();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(viewport.is_settled());
        assert!(viewport.slots().all(|slot| slot.image.is_loaded()));
        assert!(engine.stats().cache.entries >= 16);

        engine.shutdown_async().await;
    }

    #[tokio::test]
    async fn test_invalid_template_fails_to_start() {
        let config = EngineConfig::default().with_url_template("https://tiles.test/{z}/{x}.png");
        let err = TileEngine::start_with_client(config, Some(Handle::current()), green()).unwrap_err();
        assert!(matches!(err, EngineError::Source(SourceError::InvalidTemplate { .. })));
    }

    #[test]
    fn test_owned_runtime_shutdown() {
        let mut engine = TileEngine::start_with_client(config(), None, green()).unwrap();
        assert!(engine.take_backend().is_some());
        assert_eq!(engine.stats().queued, 0);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_owned_runtime_shutdown_inside_async_context() {
        let mut engine = TileEngine::start_with_client(config(), None, green()).unwrap();
        assert!(engine.take_backend().is_some());
        engine.shutdown();
    }
}
