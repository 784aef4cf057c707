//! Fetch task and result types.

use std::fmt;

use crate::tile::{TileImage, TileKey};

/// Why a tile was requested.
///
/// Visible-slot fetches are always served before pre-cache fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchOrigin {
    /// A slot in the current grid is waiting for this tile.
    Visible,
    /// Speculative fetch around the center of interest.
    PreCache,
}

impl fmt::Display for FetchOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOrigin::Visible => f.write_str("visible"),
            FetchOrigin::PreCache => f.write_str("precache"),
        }
    }
}

/// A unit of fetch work.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTask {
    /// Tile to fetch.
    pub key: TileKey,
    /// Lane the task was queued on.
    pub origin: FetchOrigin,
    /// Queue generation at enqueue time. Tasks older than the queue's
    /// current generation are abandoned without fetching.
    pub generation: u64,
    /// Number of failed attempts so far.
    pub attempt: u32,
}

impl FetchTask {
    /// Creates a first-attempt task.
    pub fn new(key: TileKey, origin: FetchOrigin, generation: u64) -> Self {
        Self {
            key,
            origin,
            generation,
            attempt: 0,
        }
    }

    /// Returns the task for the next attempt.
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// Outcome of a fetch, delivered to the apply tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// Tile that was fetched.
    pub key: TileKey,
    /// Lane the task came from.
    pub origin: FetchOrigin,
    /// Decoded image, or [`TileImage::Unavailable`] after a permanent
    /// failure or exhausted retries.
    pub image: TileImage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::SourceId;

    #[test]
    fn test_next_attempt() {
        let key = TileKey::new(1, 0, 0, SourceId::new("t/{z}/{x}/{y}", None));
        let task = FetchTask::new(key, FetchOrigin::Visible, 7);
        assert_eq!(task.attempt, 0);

        let retry = task.clone().next_attempt().next_attempt();
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.generation, 7);
        assert_eq!(retry.key, task.key);
    }
}
