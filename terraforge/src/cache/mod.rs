//! Bounded in-memory tile cache.
//!
//! Tiles are keyed by [`TileKey`](crate::tile::TileKey) and evicted in
//! least-recently-used order once the configured entry limit is exceeded.
//! The cache is internally synchronized and is shared via `Arc` between the
//! viewport, the fetch workers and the pre-cache scheduler.

mod memory;

pub use memory::{CacheStats, TileCache, DEFAULT_MAX_ENTRIES};
