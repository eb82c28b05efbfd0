//! Mutex-guarded priority queue.
//!
//! Every mutation takes the FIFO [`AsyncMutex`] first, then applies one
//! synchronous [`WorkHeap`] operation. The heap also sits behind a plain
//! `std::sync::Mutex` that is never held across an `.await`; readers
//! (`len`, `snapshot`, `peek`) use only that, so they see the state between
//! two mutations without queueing behind writers.

pub mod heap;

pub use heap::WorkHeap;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tracing::trace;

use crate::model::{WorkId, WorkItem};
use crate::sync::AsyncMutex;

#[derive(Debug, Default)]
pub struct PriorityQueue {
    mutex: AsyncMutex,
    heap: Mutex<WorkHeap>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn heap(&self) -> MutexGuard<'_, WorkHeap> {
        // Heap operations are panic-free on valid indices; recover the data
        // rather than poisoning every later caller.
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit an item. Returns `false` if its id is already queued.
    pub async fn enqueue(&self, item: WorkItem) -> bool {
        let _hold = self.mutex.acquire().await;
        let mut heap = self.heap();
        let added = heap.push(item);
        debug_assert!(heap.check_invariants().is_ok());
        added
    }

    /// Remove and return the most urgent item.
    pub async fn dequeue(&self) -> Option<WorkItem> {
        let _hold = self.mutex.acquire().await;
        self.heap().pop()
    }

    /// Most urgent item, claimed or not.
    pub fn peek(&self) -> Option<WorkItem> {
        self.heap().peek().cloned()
    }

    pub async fn claim(&self, worker_id: &str) -> Option<WorkItem> {
        let _hold = self.mutex.acquire().await;
        self.heap().claim(worker_id, Utc::now())
    }

    /// See [`WorkHeap::release`].
    pub async fn release(&self, id: &WorkId, success: bool) -> Option<WorkItem> {
        let _hold = self.mutex.acquire().await;
        let mut heap = self.heap();
        let out = heap.release(id, success);
        debug_assert!(heap.check_invariants().is_ok());
        out
    }

    pub async fn update_priority(&self, id: &WorkId, priority: u8) -> bool {
        let _hold = self.mutex.acquire().await;
        self.heap().update_priority(id, priority)
    }

    pub async fn remove(&self, id: &WorkId) -> Option<WorkItem> {
        let _hold = self.mutex.acquire().await;
        self.heap().remove(id)
    }

    /// Release claims older than `max_age`. Returns how many were cleared.
    pub async fn clear_stale(&self, max_age: Duration) -> usize {
        self.mutex
            .run_exclusive(move || async move {
                let released = self.heap().clear_stale(max_age, Utc::now());
                trace!(count = released.len(), "stale claims cleared");
                released.len()
            })
            .await
    }

    /// Remove every unclaimed item with priority above `max_priority` in a
    /// single critical section.
    pub async fn purge_unclaimed_above(&self, max_priority: u8) -> Vec<WorkItem> {
        let _hold = self.mutex.acquire().await;
        self.heap().purge_unclaimed_above(max_priority)
    }

    /// Remove every item.
    pub async fn drain(&self) -> Vec<WorkItem> {
        let _hold = self.mutex.acquire().await;
        self.heap().drain()
    }

    pub fn len(&self) -> usize {
        self.heap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap().is_empty()
    }

    /// Copy of every item in storage order.
    pub fn snapshot(&self) -> Vec<WorkItem> {
        self.heap().items().to_vec()
    }

    pub fn get(&self, id: &WorkId) -> Option<WorkItem> {
        self.heap().get(id).cloned()
    }

    /// Advisory: callers currently queued for the lock.
    pub fn waiting_count(&self) -> usize {
        self.mutex.waiting_count()
    }

    /// Heap/index consistency check.
    pub fn check_invariants(&self) -> Result<(), String> {
        self.heap().check_invariants()
    }
}
