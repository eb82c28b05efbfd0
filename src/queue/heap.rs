//! Binary min-heap of work items with an id → index side map.
//!
//! Plain synchronous structure; [`super::PriorityQueue`] supplies the locking.
//! Every structural change goes through [`WorkHeap::swap`], [`WorkHeap::push`]
//! or [`WorkHeap::remove_at`], which keep the index map in step with the
//! backing vector.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::{Claim, MAX_PRIORITY, WorkId, WorkItem};

#[derive(Debug, Default, Clone)]
pub struct WorkHeap {
    items: Vec<WorkItem>,
    index: HashMap<WorkId, usize>,
}

impl WorkHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &WorkId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &WorkId) -> Option<&WorkItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    /// Items in storage order.
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn peek(&self) -> Option<&WorkItem> {
        self.items.first()
    }

    /// Insert and sift up. Returns `false` (and changes nothing) if an item
    /// with the same id is already queued.
    pub fn push(&mut self, item: WorkItem) -> bool {
        if self.index.contains_key(&item.id) {
            return false;
        }
        let at = self.items.len();
        self.index.insert(item.id.clone(), at);
        self.items.push(item);
        self.sift_up(at);
        true
    }

    /// Remove and return the most urgent item.
    pub fn pop(&mut self) -> Option<WorkItem> {
        if self.items.is_empty() {
            None
        } else {
            self.remove_at(0)
        }
    }

    /// Claim the most urgent unclaimed item for `worker_id`.
    ///
    /// Ties on priority go to the item admitted first. The scan is linear;
    /// the heap only orders the root, not the unclaimed subset.
    pub fn claim(&mut self, worker_id: &str, now: DateTime<Utc>) -> Option<WorkItem> {
        let at = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.claim.is_none())
            .min_by_key(|(_, item)| (item.priority, item.enqueued_at))
            .map(|(i, _)| i)?;

        let item = &mut self.items[at];
        item.claim = Some(Claim {
            worker_id: worker_id.to_string(),
            claimed_at: now,
        });
        item.attempts += 1;
        Some(item.clone())
    }

    /// Finish an item. Success removes it; failure degrades its priority by
    /// the failure penalty, drops the claim and restores heap order.
    /// Returns the item's state after the operation, `None` for unknown ids.
    pub fn release(&mut self, id: &WorkId, success: bool) -> Option<WorkItem> {
        let at = *self.index.get(id)?;
        if success {
            return self.remove_at(at);
        }

        let item = &mut self.items[at];
        item.priority = item.degraded_priority();
        item.claim = None;
        let snapshot = item.clone();
        self.resift(at);
        Some(snapshot)
    }

    /// Change an item's priority (clamped to 99). Returns `false` for
    /// unknown ids.
    pub fn update_priority(&mut self, id: &WorkId, priority: u8) -> bool {
        let Some(&at) = self.index.get(id) else {
            return false;
        };
        let priority = priority.min(MAX_PRIORITY);
        let old = std::mem::replace(&mut self.items[at].priority, priority);
        if priority < old {
            self.sift_up(at);
        } else {
            self.sift_down(at);
        }
        true
    }

    /// Remove by id, claimed or not.
    pub fn remove(&mut self, id: &WorkId) -> Option<WorkItem> {
        let at = *self.index.get(id)?;
        self.remove_at(at)
    }

    /// Drop every claim older than `max_age`; the items stay queued.
    /// Returns the ids that were released.
    pub fn clear_stale(&mut self, max_age: Duration, now: DateTime<Utc>) -> Vec<WorkId> {
        let mut released = Vec::new();
        for item in &mut self.items {
            if item.claim_is_stale(max_age, now) {
                item.claim = None;
                released.push(item.id.clone());
            }
        }
        released
    }

    /// Remove every unclaimed item less urgent than `max_priority`.
    pub fn purge_unclaimed_above(&mut self, max_priority: u8) -> Vec<WorkItem> {
        let doomed: Vec<WorkId> = self
            .items
            .iter()
            .filter(|item| item.claim.is_none() && item.priority > max_priority)
            .map(|item| item.id.clone())
            .collect();

        doomed.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Remove everything, returning the items in storage order.
    pub fn drain(&mut self) -> Vec<WorkItem> {
        self.index.clear();
        std::mem::take(&mut self.items)
    }

    /// Check heap order and index consistency. Used by tests and debug
    /// assertions.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.index.len() != self.items.len() {
            return Err(format!(
                "index has {} entries for {} items",
                self.index.len(),
                self.items.len()
            ));
        }
        for (i, item) in self.items.iter().enumerate() {
            match self.index.get(&item.id) {
                Some(&at) if at == i => {}
                other => return Err(format!("item {} at {i} indexed as {other:?}", item.id)),
            }
            for child in [2 * i + 1, 2 * i + 2] {
                if let Some(c) = self.items.get(child) {
                    if item.priority > c.priority {
                        return Err(format!(
                            "heap order broken: {i} (p{}) > {child} (p{})",
                            item.priority, c.priority
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Structural primitives
    // -----------------------------------------------------------------------

    fn remove_at(&mut self, at: usize) -> Option<WorkItem> {
        if at >= self.items.len() {
            return None;
        }
        let last = self.items.len() - 1;
        if at != last {
            self.swap(at, last);
        }
        let item = self.items.pop()?;
        self.index.remove(&item.id);
        if at < self.items.len() {
            self.resift(at);
        }
        Some(item)
    }

    /// Restore order around `at` after an arbitrary change there.
    fn resift(&mut self, at: usize) {
        let at = self.sift_down(at);
        self.sift_up(at);
    }

    fn sift_up(&mut self, mut at: usize) -> usize {
        while at > 0 {
            let parent = (at - 1) / 2;
            if self.items[parent].priority <= self.items[at].priority {
                break;
            }
            self.swap(at, parent);
            at = parent;
        }
        at
    }

    fn sift_down(&mut self, mut at: usize) -> usize {
        loop {
            let left = 2 * at + 1;
            let right = left + 1;
            let mut smallest = at;

            if left < self.items.len() && self.items[left].priority < self.items[smallest].priority
            {
                smallest = left;
            }
            if right < self.items.len()
                && self.items[right].priority < self.items[smallest].priority
            {
                smallest = right;
            }
            if smallest == at {
                return at;
            }
            self.swap(at, smallest);
            at = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.items.swap(a, b);
        self.index.insert(self.items[a].id.clone(), a);
        self.index.insert(self.items[b].id.clone(), b);
    }
}
