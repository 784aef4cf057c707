//! In-memory tile cache with least-recently-used eviction.
//!
//! The cache is shared between the apply tick, the fetch workers and the
//! pre-cache loop. All state sits behind one `parking_lot::Mutex`; every
//! method acquires and releases it internally, so callers never hold the
//! cache lock while taking another lock.
//!
//! Recency is tracked with a monotonically increasing stamp per entry and a
//! `BTreeMap` from stamp to key, which makes eviction order deterministic:
//! the entry with the smallest stamp goes first.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::tile::{TileImage, TileKey};

/// Default maximum number of cached tiles.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found a tile.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries removed to stay within capacity.
    pub evictions: u64,
    /// Entries currently cached.
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups that were hits, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry {
    image: TileImage,
    stamp: u64,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<TileKey, Entry>,
    order: BTreeMap<u64, TileKey>,
    next_stamp: u64,
}

impl LruState {
    fn bump(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    fn touch(&mut self, key: &TileKey) -> Option<TileImage> {
        let stamp = self.bump();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.stamp);
        entry.stamp = stamp;
        self.order.insert(stamp, key.clone());
        Some(entry.image.clone())
    }

    fn insert(&mut self, key: TileKey, image: TileImage) {
        let stamp = self.bump();
        if let Some(previous) = self.entries.insert(key.clone(), Entry { image, stamp }) {
            self.order.remove(&previous.stamp);
        }
        self.order.insert(stamp, key);
    }

    fn evict_to(&mut self, capacity: usize) -> u64 {
        let mut evicted = 0;
        while self.entries.len() > capacity {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&key);
            evicted += 1;
        }
        evicted
    }
}

/// Bounded, thread-safe tile cache.
///
/// # Example
///
/// ```
/// use terraforge::cache::TileCache;
/// use terraforge::tile::{SourceId, TileImage, TileKey};
///
/// let cache = TileCache::new(2);
/// let source = SourceId::new("https://tiles/{z}/{x}/{y}.png", None);
/// let image = TileImage::from_rgba(image::RgbaImage::new(1, 1));
///
/// cache.put(TileKey::new(1, 0, 0, source.clone()), image.clone());
/// cache.put(TileKey::new(1, 1, 0, source.clone()), image.clone());
/// cache.put(TileKey::new(1, 0, 1, source.clone()), image);
///
/// assert_eq!(cache.len(), 2);
/// assert!(!cache.contains(&TileKey::new(1, 0, 0, source)));
/// ```
pub struct TileCache {
    state: Mutex<LruState>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    /// Creates a cache holding at most `capacity` tiles.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::default()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up a tile and marks it most recently used.
    pub fn get(&self, key: &TileKey) -> Option<TileImage> {
        let found = self.state.lock().touch(key);
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Returns true if the tile is cached, without changing its recency.
    pub fn contains(&self, key: &TileKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Inserts or replaces a tile, evicting least recently used entries
    /// until the cache is back within capacity.
    ///
    /// Placeholder images are ignored: a slot that failed to load should be
    /// retried the next time it becomes visible.
    pub fn put(&self, key: TileKey, image: TileImage) {
        if image.is_placeholder() {
            return;
        }

        let evicted = {
            let mut state = self.state.lock();
            state.insert(key, image);
            state.evict_to(self.capacity)
        };

        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            debug!(evicted, capacity = self.capacity, "Evicted tiles from cache");
        }
    }

    /// Removes every cached tile.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    /// Number of cached tiles.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached tiles.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
