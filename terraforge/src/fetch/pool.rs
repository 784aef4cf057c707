//! Fetch worker pool.
//!
//! A fixed number of long-lived tokio tasks share one [`FetchQueue`] and one
//! results channel. Each worker:
//!
//! 1. Waits for a task (suspends while the queue is empty)
//! 2. Abandons it if it predates the last queue clear or belongs to a
//!    replaced tile source
//! 3. Serves it from the cache if possible
//! 4. Otherwise resolves it via the [`TileResolver`], caching loaded images
//! 5. Retries transient failures with backoff, surfacing
//!    [`TileImage::Unavailable`] once retries run out or the failure is
//!    permanent
//!
//! Results are sent unconditionally; the apply tick decides whether they are
//! still relevant.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::policy::RetryPolicy;
use super::queue::FetchQueue;
use super::task::{FetchResult, FetchTask};
use crate::cache::TileCache;
use crate::source::{SourceHandle, TileResolver};
use crate::tile::TileImage;

/// Default number of fetch workers.
pub const DEFAULT_WORKER_COUNT: usize = 25;

/// Counters describing pool activity.
#[derive(Debug, Default)]
struct FetchStats {
    completed: AtomicU64,
    cache_hits: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`FetchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStatsSnapshot {
    /// Tiles resolved from store or network.
    pub completed: u64,
    /// Tasks answered from the cache.
    pub cache_hits: u64,
    /// Transient failures that were re-queued.
    pub retried: u64,
    /// Tasks that ended as unavailable.
    pub failed: u64,
    /// Tasks dropped as stale.
    pub abandoned: u64,
}

impl FetchStats {
    /// Returns a snapshot of the counters.
    pub fn snapshot(&self) -> FetchStatsSnapshot {
        FetchStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Everything a worker needs, shared by all workers.
pub struct FetchContext {
    /// Task queue.
    pub queue: Arc<FetchQueue>,
    /// Shared tile cache.
    pub cache: Arc<TileCache>,
    /// Current tile source.
    pub source: Arc<SourceHandle>,
    /// Store/network resolver.
    pub resolver: Arc<TileResolver>,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Results channel drained by the apply tick.
    pub results: mpsc::UnboundedSender<FetchResult>,
}

struct Worker {
    ctx: FetchContext,
    stats: Arc<FetchStats>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self: Arc<Self>, id: usize) {
        trace!(worker = id, "Fetch worker started");

        loop {
            let task = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,
                task = self.ctx.queue.pop() => task,
            };

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,
                _ = self.process(task) => {}
            }
        }

        trace!(worker = id, "Fetch worker stopped");
    }

    fn is_stale(&self, task: &FetchTask) -> bool {
        task.generation < self.ctx.queue.generation()
            || !self.ctx.source.is_current(&task.key.source)
    }

    async fn process(&self, task: FetchTask) {
        if self.is_stale(&task) {
            trace!(tile = %task.key, origin = %task.origin, "Abandoning stale fetch task");
            self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if let Some(image) = self.ctx.cache.get(&task.key) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            self.emit(&task, image);
            return;
        }

        let source = self.ctx.source.current();
        if source.id() != &task.key.source {
            self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.ctx.resolver.resolve(&source, &task.key).await {
            Ok(image) => {
                debug!(tile = %task.key, origin = %task.origin, "Tile loaded");
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                if self.ctx.source.is_current(&task.key.source) {
                    self.ctx.cache.put(task.key.clone(), image.clone());
                }
                self.emit(&task, image);
            }
            Err(e) if e.is_transient() => {
                let retry = task.attempt + 1;
                match self.ctx.retry.delay_for_attempt(retry) {
                    Some(delay) => {
                        debug!(
                            tile = %task.key,
                            attempt = retry,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Transient fetch failure, retrying"
                        );
                        self.stats.retried.fetch_add(1, Ordering::Relaxed);
                        self.requeue_after(task.next_attempt(), delay);
                    }
                    None => {
                        warn!(tile = %task.key, attempts = retry, error = %e, "Tile unavailable after retries");
                        self.fail(&task);
                    }
                }
            }
            Err(e) => {
                debug!(tile = %task.key, error = %e, "Tile unavailable");
                self.fail(&task);
            }
        }
    }

    fn requeue_after(&self, task: FetchTask, delay: std::time::Duration) {
        let queue = Arc::clone(&self.ctx.queue);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.push(task),
            }
        });
    }

    fn fail(&self, task: &FetchTask) {
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        self.emit(task, TileImage::Unavailable);
    }

    fn emit(&self, task: &FetchTask, image: TileImage) {
        // The receiver is gone only during teardown
        let _ = self.ctx.results.send(FetchResult {
            key: task.key.clone(),
            origin: task.origin,
            image,
        });
    }
}

/// Pool of fetch workers.
pub struct FetchWorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    stats: Arc<FetchStats>,
}

impl FetchWorkerPool {
    /// Spawns `workers` workers on `handle`.
    ///
    /// A worker count of zero is raised to one.
    pub fn start(handle: &Handle, workers: usize, ctx: FetchContext) -> Self {
        let workers = workers.max(1);
        let shutdown = CancellationToken::new();
        let stats = Arc::new(FetchStats::default());
        let worker = Arc::new(Worker {
            ctx,
            stats: Arc::clone(&stats),
            shutdown: shutdown.clone(),
        });

        let handles = (0..workers)
            .map(|id| handle.spawn(Arc::clone(&worker).run(id)))
            .collect();

        info!(workers, "Fetch worker pool started");

        Self {
            handles,
            shutdown,
            stats,
        }
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Activity counters.
    pub fn stats(&self) -> FetchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Token cancelled when the pool shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signals every worker to stop without waiting.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Stops all workers and waits for them to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for handle in std::mem::take(&mut self.handles) {
            let _ = handle.await;
        }
        info!("Fetch worker pool stopped");
    }
}

impl Drop for FetchWorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchOrigin;
    use crate::source::{MockHttpClient, SourceError, TileSource};
    use crate::tile::png_bytes;
    use bytes::Bytes;
    use image::Rgba;
    use std::time::Duration;

    struct Harness {
        queue: Arc<FetchQueue>,
        cache: Arc<TileCache>,
        source: Arc<SourceHandle>,
        results: mpsc::UnboundedReceiver<FetchResult>,
        pool: FetchWorkerPool,
    }

    fn harness(http: Arc<MockHttpClient>, retry: RetryPolicy) -> Harness {
        let queue = Arc::new(FetchQueue::new());
        let cache = Arc::new(TileCache::new(64));
        let source = Arc::new(SourceHandle::new(
            TileSource::new("https://t.example/{z}/{x}/{y}.png", 256, 19).unwrap(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = FetchContext {
            queue: Arc::clone(&queue),
            cache: Arc::clone(&cache),
            source: Arc::clone(&source),
            resolver: Arc::new(TileResolver::new(http)),
            retry,
            results: tx,
        };
        let pool = FetchWorkerPool::start(&Handle::current(), 4, ctx);
        Harness {
            queue,
            cache,
            source,
            results: rx,
            pool,
        }
    }

    fn ok_tile() -> Result<Bytes, SourceError> {
        Ok(Bytes::from(png_bytes(256, Rgba([0, 128, 0, 255]))))
    }

    async fn next(h: &mut Harness) -> FetchResult {
        tokio::time::timeout(Duration::from_secs(5), h.results.recv())
            .await
            .expect("timed out waiting for fetch result")
            .expect("results channel closed")
    }

    #[tokio::test]
    async fn test_fetch_loads_and_caches() {
        let http = Arc::new(MockHttpClient::always(ok_tile()));
        let mut h = harness(http, RetryPolicy::None);
        let key = h.source.current().key(3, 2, 1);

        h.queue.enqueue(key.clone(), FetchOrigin::Visible);
        let result = next(&mut h).await;

        assert_eq!(result.key, key);
        assert!(result.image.is_loaded());
        assert!(h.cache.contains(&key));
        assert_eq!(h.pool.stats().completed, 1);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let http = Arc::new(MockHttpClient::always(ok_tile()));
        let mut h = harness(http.clone(), RetryPolicy::None);
        let key = h.source.current().key(3, 2, 1);
        h.cache.put(key.clone(), TileImage::from_rgba(image::RgbaImage::new(256, 256)));

        h.queue.enqueue(key, FetchOrigin::PreCache);
        let result = next(&mut h).await;

        assert!(result.image.is_loaded());
        assert_eq!(http.call_count(), 0);
        assert_eq!(h.pool.stats().cache_hits, 1);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_permanent_failure_is_unavailable() {
        let http = Arc::new(MockHttpClient::always(Err(SourceError::Status {
            status: 404,
            url: "x".into(),
        })));
        let mut h = harness(http.clone(), RetryPolicy::exponential(4));
        let key = h.source.current().key(3, 2, 1);

        h.queue.enqueue(key.clone(), FetchOrigin::Visible);
        let result = next(&mut h).await;

        assert_eq!(result.image, TileImage::Unavailable);
        assert_eq!(http.call_count(), 1);
        assert!(!h.cache.contains(&key));
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_gives_up() {
        let http = Arc::new(MockHttpClient::always(Err(SourceError::Status {
            status: 503,
            url: "x".into(),
        })));
        let mut h = harness(http.clone(), RetryPolicy::fixed(3, Duration::from_millis(5)));
        let key = h.source.current().key(3, 2, 1);

        h.queue.enqueue(key, FetchOrigin::Visible);
        let result = next(&mut h).await;

        assert_eq!(result.image, TileImage::Unavailable);
        assert_eq!(http.call_count(), 3);
        assert_eq!(h.pool.stats().retried, 2);
        assert_eq!(h.pool.stats().failed, 1);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let http = Arc::new(MockHttpClient::always(ok_tile()));
        http.respond(
            "https://t.example/3/2/1.png",
            Err(SourceError::Timeout(Duration::from_secs(10))),
        );
        let mut h = harness(http.clone(), RetryPolicy::fixed(4, Duration::from_millis(50)));
        let key = h.source.current().key(3, 2, 1);

        h.queue.enqueue(key, FetchOrigin::Visible);
        tokio::time::sleep(Duration::from_millis(10)).await;
        http.respond("https://t.example/3/2/1.png", ok_tile());

        let result = next(&mut h).await;
        assert!(result.image.is_loaded());
        assert!(http.call_count() >= 2);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_generation_is_abandoned() {
        let http = Arc::new(MockHttpClient::always(ok_tile()));
        let mut h = harness(http.clone(), RetryPolicy::None);
        let key = h.source.current().key(3, 2, 1);

        // Enqueued under generation 0, then the queue moves on
        h.queue.push(FetchTask::new(key.clone(), FetchOrigin::Visible, 0));
        h.queue.clear();
        h.queue.push(FetchTask::new(key, FetchOrigin::Visible, 0));
        let fresh = h.source.current().key(3, 0, 0);
        h.queue.enqueue(fresh.clone(), FetchOrigin::Visible);

        let result = next(&mut h).await;
        assert_eq!(result.key, fresh);
        assert_eq!(http.call_count(), 1);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_replaced_source_is_abandoned() {
        let http = Arc::new(MockHttpClient::always(ok_tile()));
        let mut h = harness(http.clone(), RetryPolicy::None);
        let old = h.source.current().key(3, 2, 1);

        h.source
            .replace(TileSource::new("https://other.example/{z}/{x}/{y}.png", 256, 19).unwrap());
        h.queue.enqueue(old, FetchOrigin::Visible);
        let fresh = h.source.current().key(3, 0, 0);
        h.queue.enqueue(fresh.clone(), FetchOrigin::Visible);

        let result = next(&mut h).await;
        assert_eq!(result.key, fresh);
        assert_eq!(http.call_count(), 1);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_workers() {
        let http = Arc::new(MockHttpClient::always(ok_tile()));
        let h = harness(http, RetryPolicy::None);
        assert_eq!(h.pool.worker_count(), 4);

        tokio::time::timeout(Duration::from_secs(1), h.pool.shutdown())
            .await
            .expect("shutdown hung");
    }
}
