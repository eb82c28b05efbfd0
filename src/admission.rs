//! Admission fast path: a trailing time window plus a bounded recently-seen
//! set.
//!
//! Neither piece is authoritative. The queue's id map decides what is a
//! duplicate; this only turns away obviously stale or repeated requests
//! before they reach the queue lock.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

/// Default trailing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Soft cap of the recently-seen set.
pub const SEEN_CAPACITY: usize = 10_000;
/// Entries kept after the set overflows.
pub const SEEN_RETAIN: usize = 5_000;

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// Accepts timestamps inside `[now - window, now]` that are also after the
/// process started, so a restart never replays historical backlog.
#[derive(Debug, Clone)]
pub struct AdmissionWindow {
    window: TimeDelta,
    started_at: DateTime<Utc>,
}

impl AdmissionWindow {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Utc::now())
    }

    pub fn starting_at(window: Duration, started_at: DateTime<Utc>) -> Self {
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        info!(
            window_secs = window.num_seconds(),
            started_at = %started_at,
            "admission window configured"
        );
        Self { window, started_at }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn window(&self) -> Duration {
        self.window.to_std().unwrap_or_default()
    }

    /// Earliest timestamp worth considering at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let trailing = now.checked_sub_signed(self.window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        trailing.max(self.started_at)
    }

    pub fn should_process(&self, timestamp: DateTime<Utc>) -> bool {
        self.should_process_at(timestamp, Utc::now())
    }

    pub fn should_process_at(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let trailing = now.checked_sub_signed(self.window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        timestamp > trailing && timestamp > self.started_at
    }
}

// ---------------------------------------------------------------------------
// Recently seen
// ---------------------------------------------------------------------------

/// Insertion-ordered set of ids. On overflow only the newest entries
/// survive; the oldest half goes in one sweep.
#[derive(Debug)]
pub struct RecentlySeen {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
    retain: usize,
}

impl Default for RecentlySeen {
    fn default() -> Self {
        Self::with_limits(SEEN_CAPACITY, SEEN_RETAIN)
    }
}

impl RecentlySeen {
    pub fn new() -> Self {
        Self::default()
    }

    /// `retain` is clamped to `capacity`.
    pub fn with_limits(capacity: usize, retain: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity,
            retain: retain.min(capacity),
        }
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id`. Re-marking an id does not refresh its position.
    pub fn mark_seen(&mut self, id: &str) {
        if !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());

        if self.ids.len() > self.capacity {
            let evict = self.order.len() - self.retain;
            for old in self.order.drain(..evict) {
                self.ids.remove(&old);
            }
            debug!(evicted = evict, kept = self.ids.len(), "recently-seen set trimmed");
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Verdict for one incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    /// Older than the window or than process start.
    OutsideWindow,
    /// Seen recently.
    Duplicate,
}

/// Window and recently-seen set behind one shareable handle.
#[derive(Debug)]
pub struct AdmissionFilter {
    window: AdmissionWindow,
    seen: Mutex<RecentlySeen>,
}

impl AdmissionFilter {
    pub fn new(window: AdmissionWindow) -> Self {
        Self::with_seen(window, RecentlySeen::new())
    }

    pub fn with_seen(window: AdmissionWindow, seen: RecentlySeen) -> Self {
        Self {
            window,
            seen: Mutex::new(seen),
        }
    }

    pub fn window(&self) -> &AdmissionWindow {
        &self.window
    }

    /// Classify without recording anything.
    pub fn check(&self, id: &str, timestamp: DateTime<Utc>) -> Admission {
        if !self.window.should_process(timestamp) {
            return Admission::OutsideWindow;
        }
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.has_seen(id) {
            Admission::Duplicate
        } else {
            Admission::Accept
        }
    }

    /// Classify and, when accepted, mark `id` as seen in the same step.
    pub fn admit(&self, id: &str, timestamp: DateTime<Utc>) -> Admission {
        if !self.window.should_process(timestamp) {
            return Admission::OutsideWindow;
        }
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.has_seen(id) {
            return Admission::Duplicate;
        }
        seen.mark_seen(id);
        Admission::Accept
    }

    /// Forget every seen id.
    pub fn reset(&self) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
