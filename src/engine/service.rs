//! Queue service: the operational face of the priority queue.
//!
//! Fills in admission defaults, filters submissions, tracks throughput, emits
//! events, counts metrics, and owns the stale-claim reaper. Cheap to clone; every clone
//! shares the same queue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tokio::sync::{Notify, broadcast};
use tracing::{debug, info, warn};

use crate::admission::{Admission, AdmissionFilter, AdmissionWindow};
use crate::config::QueueConfig;
use crate::event::{Event, EventBus, EventKind, ItemView};
use crate::model::{NewWorkItem, WorkId, WorkItem};
use crate::queue::PriorityQueue;
use crate::telemetry::metrics;

use super::reaper::ReaperHandle;
use super::stats::{PriorityBand, QueueStats, StatsReport, ThroughputTracker};

struct Inner {
    queue: PriorityQueue,
    config: QueueConfig,
    admission: AdmissionFilter,
    throughput: Mutex<ThroughputTracker>,
    events: EventBus,
    work_ready: Notify,
}

/// Shared handle to one queue and its policy.
#[derive(Clone)]
pub struct QueueService {
    inner: Arc<Inner>,
}

impl Default for QueueService {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl QueueService {
    /// The admission window opens now and spans `config.admission_window`.
    pub fn new(config: QueueConfig) -> Self {
        let admission = AdmissionFilter::new(AdmissionWindow::new(config.admission_window));
        Self::with_admission(config, admission)
    }

    /// Like [`new`](Self::new) with a caller-built admission filter.
    pub fn with_admission(config: QueueConfig, admission: AdmissionFilter) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                queue: PriorityQueue::new(),
                config,
                admission,
                throughput: Mutex::new(ThroughputTracker::new()),
                events,
                work_ready: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn admission(&self) -> &AdmissionFilter {
        &self.inner.admission
    }

    fn throughput(&self) -> MutexGuard<'_, ThroughputTracker> {
        self.inner
            .throughput
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Producer side
    // -----------------------------------------------------------------------

    /// Admit new work as an unclaimed item with zero attempts.
    ///
    /// Returns `false` if an item with the same id is already queued; the
    /// queued item is left as it was.
    pub async fn enqueue(&self, new: NewWorkItem) -> bool {
        let item = new.into_item(Utc::now());
        let view = ItemView::from(&item);
        let (id, priority) = (item.id.clone(), item.priority);

        if !self.inner.queue.enqueue(item).await {
            debug!(id = %id, "already queued, ignoring");
            return false;
        }

        let band = PriorityBand::of(priority);
        metrics::items_enqueued().add(1, &[]);
        metrics::queue_depth().add(1, &[]);
        metrics::item_priority().record(priority as u64, &[KeyValue::new("band", band.as_str())]);

        info!(id = %id, priority, band = band.as_str(), "queued");
        self.inner.events.emit(EventKind::Queued { item: view });
        self.inner.work_ready.notify_one();
        true
    }

    /// Run the admission fast path, then enqueue.
    ///
    /// `origin` is when the request was created upstream. An id that passes
    /// the filter but is already queued reports [`Admission::Duplicate`].
    pub async fn submit(&self, new: NewWorkItem, origin: DateTime<Utc>) -> Admission {
        let verdict = self.inner.admission.admit(new.id().as_str(), origin);
        if verdict != Admission::Accept {
            debug!(id = %new.id(), ?verdict, "turned away at admission");
            return verdict;
        }
        if self.enqueue(new).await {
            Admission::Accept
        } else {
            Admission::Duplicate
        }
    }

    // -----------------------------------------------------------------------
    // Worker side
    // -----------------------------------------------------------------------

    /// Claim the most urgent unclaimed item for `worker_id`.
    pub async fn claim(&self, worker_id: &str) -> Option<WorkItem> {
        let item = self.inner.queue.claim(worker_id).await?;

        if let Some(claimed_at) = item.claimed_at() {
            let wait = (claimed_at - item.enqueued_at).num_milliseconds().max(0);
            metrics::wait_time_ms().record(wait as f64, &[]);
        }
        metrics::items_claimed().add(1, &[]);

        info!(
            id = %item.id,
            worker_id,
            priority = item.priority,
            attempt = item.attempts,
            "claimed"
        );
        self.inner.events.emit(EventKind::Claimed {
            item_id: item.id.to_string(),
            worker_id: worker_id.to_string(),
        });
        Some(item)
    }

    /// Report the outcome of a claimed item. Success removes it; failure
    /// requeues it at a lower urgency. Unknown ids are ignored.
    pub async fn complete(&self, id: &WorkId, success: bool) {
        let Some(after) = self.inner.queue.release(id, success).await else {
            debug!(id = %id, success, "completion for unknown item ignored");
            return;
        };

        if success {
            self.throughput().record(Utc::now());
            metrics::items_completed().add(1, &[KeyValue::new("result", "ok")]);
            metrics::queue_depth().add(-1, &[]);
            info!(id = %id, attempts = after.attempts, "completed");
        } else {
            metrics::items_completed().add(1, &[KeyValue::new("result", "requeued")]);
            if after.attempts > after.max_retries {
                // Advisory ceiling only; the item keeps retrying.
                warn!(
                    id = %id,
                    attempts = after.attempts,
                    max_retries = after.max_retries,
                    "past its retry ceiling, requeued anyway"
                );
            }
            info!(id = %id, priority = after.priority, "requeued at lower priority");
            self.inner.work_ready.notify_one();
        }

        self.inner.events.emit(EventKind::Completed {
            item_id: id.to_string(),
            success,
        });
    }

    /// Resolves when an item may have become claimable.
    pub async fn wait_for_work(&self) {
        self.inner.work_ready.notified().await;
    }

    // -----------------------------------------------------------------------
    // Operator side
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> QueueStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> QueueStats {
        let items = self.inner.queue.snapshot();
        let throughput = self.throughput().per_minute(now);
        QueueStats::compute(
            &items,
            now,
            self.inner.config.stale_claim_timeout,
            throughput,
        )
    }

    /// [`stats`](Self::stats) plus the last-success time and hourly throughput.
    pub fn report(&self) -> StatsReport {
        let now = Utc::now();
        let stats = self.stats_at(now);
        let throughput_hour = self.throughput().per_hour_avg(now);
        StatsReport::new(stats, self.last_success(), throughput_hour)
    }

    /// When the last successful completion happened.
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.throughput().last_success()
    }

    /// Copy of every item in storage order.
    pub fn all_items(&self) -> Vec<WorkItem> {
        self.inner.queue.snapshot()
    }

    pub fn get(&self, id: &WorkId) -> Option<WorkItem> {
        self.inner.queue.get(id)
    }

    pub fn len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.is_empty()
    }

    /// Most urgent item without claiming it.
    pub fn peek(&self) -> Option<WorkItem> {
        self.inner.queue.peek()
    }

    /// Remove an item whatever its claim state. Returns `false` for unknown
    /// ids.
    pub async fn remove(&self, id: &WorkId) -> bool {
        if self.inner.queue.remove(id).await.is_none() {
            return false;
        }
        metrics::items_removed().add(1, &[KeyValue::new("reason", "delete")]);
        metrics::queue_depth().add(-1, &[]);
        info!(id = %id, "removed");
        self.inner.events.emit(EventKind::Deleted {
            item_id: id.to_string(),
        });
        true
    }

    /// Returns `false` for unknown ids.
    pub async fn update_priority(&self, id: &WorkId, priority: u8) -> bool {
        let updated = self.inner.queue.update_priority(id, priority).await;
        if updated {
            info!(id = %id, priority, "priority updated");
        }
        updated
    }

    /// Shed load: drop every unclaimed item less urgent than `max_priority`.
    /// Claimed items are left alone. Returns how many were purged.
    pub async fn purge_above_priority(&self, max_priority: u8) -> usize {
        let purged = self.inner.queue.purge_unclaimed_above(max_priority).await;
        let count = purged.len();
        if count == 0 {
            return 0;
        }

        metrics::items_removed().add(count as u64, &[KeyValue::new("reason", "purge")]);
        metrics::queue_depth().add(-(count as i64), &[]);
        warn!(count, max_priority, "purged low-priority items");
        for item in purged {
            self.inner.events.emit(EventKind::Deleted {
                item_id: item.id.to_string(),
            });
        }
        count
    }

    /// Remove every item and broadcast the now-empty snapshot. Returns how
    /// many were removed.
    pub async fn clear(&self) -> usize {
        let count = self.inner.queue.drain().await.len();
        if count > 0 {
            metrics::items_removed().add(count as u64, &[KeyValue::new("reason", "clear")]);
            metrics::queue_depth().add(-(count as i64), &[]);
        }
        warn!(count, "queue cleared");
        self.inner.events.emit(self.snapshot());
        count
    }

    /// Return claims older than the stale timeout to the pool.
    pub async fn release_stale_claims(&self) -> usize {
        let cleared = self
            .inner
            .queue
            .clear_stale(self.inner.config.stale_claim_timeout)
            .await;
        if cleared > 0 {
            metrics::stale_claims_released().add(cleared as u64, &[]);
            warn!(cleared, "released stale claims");
            self.inner.events.emit(EventKind::Log {
                message: format!("released {cleared} stale claims"),
            });
            self.inner.work_ready.notify_waiters();
        }
        cleared
    }

    /// Spawn the periodic stale-claim reaper. Stop it with
    /// [`ReaperHandle::stop`].
    pub fn start_reaper(&self) -> ReaperHandle {
        ReaperHandle::spawn(self.clone(), self.inner.config.reap_interval)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Broadcast a free-form log line to subscribers.
    pub fn log(&self, message: impl Into<String>) {
        self.inner.events.emit(EventKind::Log {
            message: message.into(),
        });
    }

    /// Broadcast an arbitrary event, e.g. a periodic stats push.
    pub fn emit(&self, kind: EventKind) {
        self.inner.events.emit(kind);
    }

    /// Full state as a `snapshot` event payload.
    pub fn snapshot(&self) -> EventKind {
        let items = self.all_items().iter().map(ItemView::from).collect();
        EventKind::Snapshot {
            items,
            stats: self.report(),
        }
    }
}
