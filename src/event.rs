//! Structured events emitted by the queue service on every state change.
//!
//! Consumers subscribe to build dashboards or audit trails. The serialized
//! form is the dashboard push envelope `{type, data, timestamp}` with the
//! timestamp in epoch milliseconds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::engine::stats::StatsReport;
use crate::model::WorkItem;

/// Buffered events per subscriber before the slowest one starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// A structured event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,
    /// When this event occurred.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn now(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventKind {
    /// Full state, sent on connect and after a clear.
    Snapshot {
        items: Vec<ItemView>,
        stats: StatsReport,
    },
    Queued {
        item: ItemView,
    },
    Claimed {
        #[serde(rename = "itemId")]
        item_id: String,
        #[serde(rename = "serverId")]
        worker_id: String,
    },
    Completed {
        #[serde(rename = "itemId")]
        item_id: String,
        success: bool,
    },
    Deleted {
        #[serde(rename = "itemId")]
        item_id: String,
    },
    Stats(StatsReport),
    Log {
        message: String,
    },
}

impl EventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::Snapshot { .. } => "snapshot",
            EventKind::Queued { .. } => "queued",
            EventKind::Claimed { .. } => "claimed",
            EventKind::Completed { .. } => "completed",
            EventKind::Deleted { .. } => "deleted",
            EventKind::Stats(_) => "stats",
            EventKind::Log { .. } => "log",
        }
    }
}

/// Wire shape of an item as the dashboard sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: String,
    pub priority: u8,
    pub message: serde_json::Value,
    pub context: Vec<String>,
    pub model: Option<String>,
    pub router_reason: Option<String>,
    pub claimed_by: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub claimed_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_retries: u32,
    /// Admission time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl From<&WorkItem> for ItemView {
    fn from(item: &WorkItem) -> Self {
        Self {
            id: item.id.to_string(),
            priority: item.priority,
            message: item.payload.message.clone(),
            context: item.payload.context.clone(),
            model: item.payload.model.clone(),
            router_reason: item.payload.route_reason.clone(),
            claimed_by: item.claimed_by().map(str::to_string),
            claimed_at: item.claimed_at(),
            attempts: item.attempts,
            max_retries: item.max_retries,
            timestamp: item.enqueued_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Fan-out of service events. Emitting with no subscribers is fine; slow
/// subscribers lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, kind: EventKind) {
        let event = Event::now(kind);
        trace!(event_type = event.event_type(), "event emitted");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
