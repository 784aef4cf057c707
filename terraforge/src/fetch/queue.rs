//! Shared fetch queue.
//!
//! Two FIFO lanes: visible-slot tasks are always popped before pre-cache
//! tasks, and tasks within a lane come out in enqueue order.
//!
//! [`FetchQueue::clear`] bumps the queue generation. Tasks carry the
//! generation they were enqueued under, so workers can recognise and drop
//! tasks (including delayed retries) that predate the last clear.
//!
//! # Example
//!
//! ```
//! use terraforge::fetch::{FetchOrigin, FetchQueue};
//! use terraforge::tile::{SourceId, TileKey};
//!
//! let queue = FetchQueue::new();
//! let source = SourceId::new("https://tiles/{z}/{x}/{y}.png", None);
//!
//! queue.enqueue(TileKey::new(3, 0, 0, source.clone()), FetchOrigin::PreCache);
//! queue.enqueue(TileKey::new(3, 1, 0, source), FetchOrigin::Visible);
//!
//! // The visible task comes out first despite being pushed second
//! assert_eq!(queue.try_pop().unwrap().origin, FetchOrigin::Visible);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::task::{FetchOrigin, FetchTask};
use crate::tile::TileKey;

#[derive(Debug, Default)]
struct Lanes {
    visible: VecDeque<FetchTask>,
    precache: VecDeque<FetchTask>,
}

impl Lanes {
    fn lane_mut(&mut self, origin: FetchOrigin) -> &mut VecDeque<FetchTask> {
        match origin {
            FetchOrigin::Visible => &mut self.visible,
            FetchOrigin::PreCache => &mut self.precache,
        }
    }
}

/// Multi-producer, multi-consumer fetch queue.
#[derive(Debug, Default)]
pub struct FetchQueue {
    lanes: Mutex<Lanes>,
    notify: Notify,
    generation: AtomicU64,
}

impl FetchQueue {
    /// Creates an empty queue at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current queue generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Pushes a task onto its lane and wakes one waiting worker.
    pub fn push(&self, task: FetchTask) {
        self.lanes.lock().lane_mut(task.origin).push_back(task);
        self.notify.notify_one();
    }

    /// Queues a first-attempt fetch for `key` under the current generation.
    pub fn enqueue(&self, key: TileKey, origin: FetchOrigin) {
        self.push(FetchTask::new(key, origin, self.generation()));
    }

    /// Queues several first-attempt fetches on one lane.
    ///
    /// Returns the number of tasks queued.
    pub fn push_many<I>(&self, keys: I, origin: FetchOrigin) -> usize
    where
        I: IntoIterator<Item = TileKey>,
    {
        let generation = self.generation();
        let count = {
            let mut lanes = self.lanes.lock();
            let lane = lanes.lane_mut(origin);
            let before = lane.len();
            lane.extend(
                keys.into_iter()
                    .map(|key| FetchTask::new(key, origin, generation)),
            );
            lane.len() - before
        };

        for _ in 0..count {
            self.notify.notify_one();
        }
        count
    }

    /// Pops the next task without waiting.
    pub fn try_pop(&self) -> Option<FetchTask> {
        let mut lanes = self.lanes.lock();
        lanes
            .visible
            .pop_front()
            .or_else(|| lanes.precache.pop_front())
    }

    /// Pops the next task, suspending while the queue is empty.
    pub async fn pop(&self) -> FetchTask {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.try_pop() {
                return task;
            }
            notified.await;
        }
    }

    /// Drops every queued task and advances the generation.
    ///
    /// Returns the number of tasks dropped.
    pub fn clear(&self) -> usize {
        let mut lanes = self.lanes.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        let dropped = lanes.visible.len() + lanes.precache.len();
        lanes.visible.clear();
        lanes.precache.clear();
        dropped
    }

    /// Total number of queued tasks.
    pub fn len(&self) -> usize {
        let lanes = self.lanes.lock();
        lanes.visible.len() + lanes.precache.len()
    }

    /// Returns true if no task is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tasks queued on one lane.
    pub fn pending(&self, origin: FetchOrigin) -> usize {
        self.lanes.lock().lane_mut(origin).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::SourceId;
    use std::sync::Arc;
    use std::time::Duration;

    fn key(x: i32) -> TileKey {
        TileKey::new(5, x, 0, SourceId::new("q/{z}/{x}/{y}", None))
    }

    #[test]
    fn test_fifo_within_lane() {
        let queue = FetchQueue::new();
        for x in 0..4 {
            queue.enqueue(key(x), FetchOrigin::Visible);
        }

        let order: Vec<i32> = std::iter::from_fn(|| queue.try_pop())
            .map(|t| t.key.x)
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_visible_lane_first() {
        let queue = FetchQueue::new();
        queue.push_many((0..3).map(key), FetchOrigin::PreCache);
        queue.enqueue(key(10), FetchOrigin::Visible);

        assert_eq!(queue.pending(FetchOrigin::PreCache), 3);
        assert_eq!(queue.pending(FetchOrigin::Visible), 1);
        assert_eq!(queue.try_pop().unwrap().key.x, 10);
        assert_eq!(queue.try_pop().unwrap().key.x, 0);
    }

    #[test]
    fn test_clear_bumps_generation() {
        let queue = FetchQueue::new();
        queue.push_many((0..5).map(key), FetchOrigin::Visible);
        assert_eq!(queue.generation(), 0);

        assert_eq!(queue.clear(), 5);
        assert!(queue.is_empty());
        assert_eq!(queue.generation(), 1);

        queue.enqueue(key(0), FetchOrigin::Visible);
        assert_eq!(queue.try_pop().unwrap().generation, 1);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(FetchQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.enqueue(key(42), FetchOrigin::Visible);
        let task = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.key.x, 42);
    }

    #[tokio::test]
    async fn test_push_many_wakes_all_waiters() {
        let queue = Arc::new(FetchQueue::new());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.pop().await.key.x })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push_many((0..3).map(key), FetchOrigin::PreCache);

        let mut got = Vec::new();
        for waiter in waiters {
            got.push(
                tokio::time::timeout(Duration::from_secs(1), waiter)
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        got.sort();
        assert_eq!(got, vec![0, 1, 2]);
    }
}
