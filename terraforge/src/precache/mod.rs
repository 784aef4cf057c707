//! Speculative pre-caching around the center of interest.
//!
//! A single background task walks concentric square rings around the tile
//! the viewport is centered on and queues every ring tile that is not yet
//! cached on the pre-cache lane of the [`FetchQueue`]. The walk restarts at
//! radius 1 whenever the center moves or the queue is cleared (a new queue
//! generation drops the rings already queued), and stops after
//! [`PreCacheConfig::max_radius`] rings until the next restart.
//!
//! The scheduler never touches viewport slots; it only warms the cache.
//!
//! # Example
//!
//! ```
//! use terraforge::precache::ring_tiles;
//!
//! let ring = ring_tiles(10, 10, 2);
//! assert_eq!(ring.len(), 16);
//! assert!(ring.iter().all(|&(x, y)| (x - 10).abs().max((y - 10).abs()) == 2));
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::cache::TileCache;
use crate::fetch::{FetchOrigin, FetchQueue};
use crate::tile::{SourceId, TileKey};

// ==================== Pre-cache Defaults ====================

/// Default number of rings walked around a center.
pub const DEFAULT_MAX_RADIUS: u32 = 8;

/// Default pause between rings in milliseconds.
pub const DEFAULT_RING_INTERVAL_MS: u64 = 100;

/// Default pre-cache lane length above which no further rings are queued.
pub const DEFAULT_MAX_PENDING: usize = 256;

/// How often an idle scheduler checks the queue for a new generation.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pre-cache scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PreCacheConfig {
    /// Number of rings walked around a center.
    ///
    /// Default: 8.
    pub max_radius: u32,

    /// Pause between consecutive rings.
    ///
    /// Default: 100ms.
    pub ring_interval: Duration,

    /// Back-pressure threshold on the pre-cache lane.
    ///
    /// While more tasks than this are pending, the scheduler waits instead of
    /// queueing the next ring. Default: 256.
    pub max_pending: usize,
}

impl Default for PreCacheConfig {
    fn default() -> Self {
        Self {
            max_radius: DEFAULT_MAX_RADIUS,
            ring_interval: Duration::from_millis(DEFAULT_RING_INTERVAL_MS),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl PreCacheConfig {
    /// Sets the number of rings.
    pub fn with_max_radius(mut self, max_radius: u32) -> Self {
        self.max_radius = max_radius;
        self
    }

    /// Sets the pause between rings.
    pub fn with_ring_interval(mut self, ring_interval: Duration) -> Self {
        self.ring_interval = ring_interval;
        self
    }

    /// Sets the back-pressure threshold.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }
}

/// The tile the scheduler pre-caches around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreCacheCenter {
    /// Center tile column.
    pub x: i32,
    /// Center tile row.
    pub y: i32,
    /// Zoom level to pre-cache.
    pub zoom: u8,
    /// Source to pre-cache.
    pub source: SourceId,
}

/// Returns the tiles on the square ring at Chebyshev distance `radius` from
/// `(cx, cy)`.
///
/// The ring holds exactly `8 * radius` distinct tiles for `radius >= 1`;
/// radius 0 is the center itself. Tiles are not clipped to the world.
pub fn ring_tiles(cx: i32, cy: i32, radius: u32) -> Vec<(i32, i32)> {
    let r = radius as i32;
    if r == 0 {
        return vec![(cx, cy)];
    }

    let mut tiles = Vec::with_capacity(8 * radius as usize);
    for x in (cx - r)..=(cx + r) {
        tiles.push((x, cy - r));
        tiles.push((x, cy + r));
    }
    for y in (cy - r + 1)..=(cy + r - 1) {
        tiles.push((cx - r, y));
        tiles.push((cx + r, y));
    }
    tiles
}

struct Scheduler {
    config: PreCacheConfig,
    queue: Arc<FetchQueue>,
    cache: Arc<TileCache>,
}

impl Scheduler {
    /// Queues the uncached, in-world tiles of one ring. Returns the number
    /// queued.
    fn queue_ring(&self, center: &PreCacheCenter, radius: u32) -> usize {
        let keys = ring_tiles(center.x, center.y, radius)
            .into_iter()
            .map(|(x, y)| TileKey::new(center.zoom, x, y, center.source.clone()))
            .filter(|key| key.is_in_world() && !self.cache.contains(key));
        self.queue.push_many(keys, FetchOrigin::PreCache)
    }

    async fn run(
        self,
        mut center_rx: watch::Receiver<Option<PreCacheCenter>>,
        shutdown: CancellationToken,
    ) {
        let mut current: Option<PreCacheCenter> = None;
        let mut radius = 1;
        let mut generation = self.queue.generation();

        loop {
            match center_rx.has_changed() {
                Ok(true) => {
                    current = center_rx.borrow_and_update().clone();
                    radius = 1;
                }
                Ok(false) => {}
                Err(_) => break,
            }

            let latest = self.queue.generation();
            if latest != generation {
                generation = latest;
                if radius > 1 {
                    debug!(generation, "Fetch queue cleared, restarting pre-cache walk");
                }
                radius = 1;
            }

            let center = match current.clone() {
                Some(center) if radius <= self.config.max_radius => center,
                _ => {
                    // Idle until the center moves or the queue is cleared
                    tokio::select! {
                        biased;

                        _ = shutdown.cancelled() => break,
                        changed = center_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            current = center_rx.borrow_and_update().clone();
                            radius = 1;
                            continue;
                        }
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => continue,
                    }
                }
            };

            let pending = self.queue.pending(FetchOrigin::PreCache);
            if pending > self.config.max_pending {
                trace!(pending, "Pre-cache lane full, waiting");
            } else {
                let queued = self.queue_ring(&center, radius);
                trace!(
                    x = center.x,
                    y = center.y,
                    zoom = center.zoom,
                    radius,
                    queued,
                    "Queued pre-cache ring"
                );
                radius += 1;
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.ring_interval) => {}
            }
        }
    }
}

/// Background pre-cache task.
pub struct PreCacheScheduler {
    center_tx: watch::Sender<Option<PreCacheCenter>>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PreCacheScheduler {
    /// Spawns the scheduler on `handle`. It idles until a center is set.
    pub fn start(
        handle: &Handle,
        config: PreCacheConfig,
        queue: Arc<FetchQueue>,
        cache: Arc<TileCache>,
    ) -> Self {
        let (center_tx, center_rx) = watch::channel(None);
        let shutdown = CancellationToken::new();

        info!(
            max_radius = config.max_radius,
            ring_interval_ms = config.ring_interval.as_millis() as u64,
            max_pending = config.max_pending,
            "Pre-cache scheduler started"
        );

        let scheduler = Scheduler {
            config,
            queue,
            cache,
        };
        let task = handle.spawn(scheduler.run(center_rx, shutdown.clone()));

        Self {
            center_tx,
            shutdown,
            handle: Some(task),
        }
    }

    /// Publishes a new center of interest.
    ///
    /// Setting the same center again does not restart the ring walk.
    pub fn set_center(&self, center: PreCacheCenter) {
        self.center_tx.send_if_modified(|current| {
            if current.as_ref() == Some(&center) {
                false
            } else {
                debug!(x = center.x, y = center.y, zoom = center.zoom, "Pre-cache center moved");
                *current = Some(center);
                true
            }
        });
    }

    /// Returns the current center of interest.
    pub fn center(&self) -> Option<PreCacheCenter> {
        self.center_tx.borrow().clone()
    }

    /// Signals the scheduler to stop without waiting.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Stops the scheduler and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.handle.take() {
            let _ = task.await;
        }
        info!("Pre-cache scheduler stopped");
    }
}

impl Drop for PreCacheScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
