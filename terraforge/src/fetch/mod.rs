//! Concurrent tile fetching.
//!
//! The viewport and the pre-cache scheduler push [`FetchTask`]s onto a shared
//! [`FetchQueue`]; a [`FetchWorkerPool`] drains it and reports
//! [`FetchResult`]s over an unbounded channel that the apply tick drains
//! without blocking.
//!
//! # Architecture
//!
//! ```text
//! Viewport ──┐                                  ┌──► TileCache
//!            ├──► FetchQueue ──► workers (N) ───┤
//! PreCache ──┘   visible lane                   └──► results channel ──► apply tick
//!                precache lane
//! ```

mod policy;
mod pool;
mod queue;
mod task;

pub use policy::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_SECS,
};
pub use pool::{FetchContext, FetchStatsSnapshot, FetchWorkerPool, DEFAULT_WORKER_COUNT};
pub use queue::FetchQueue;
pub use task::{FetchOrigin, FetchResult, FetchTask};
