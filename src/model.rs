//! Core data model.
//!
//! A work item is one inference request waiting for a worker. It has identity,
//! an urgency (lower = more urgent), an opaque payload, and an optional claim
//! held by the worker currently processing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Most urgent priority.
pub const MIN_PRIORITY: u8 = 0;
/// Least urgent priority. Anything above is clamped here.
pub const MAX_PRIORITY: u8 = 99;
/// Added to an item's priority when its worker reports failure.
pub const FAILURE_PENALTY: u8 = 10;
/// Advisory retry ceiling used when the producer does not give one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of work tracked by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier. Also the key of the queue's index map.
    pub id: WorkId,

    /// 0 = most urgent, 99 = least.
    pub priority: u8,

    /// Set once at admission.
    pub enqueued_at: DateTime<Utc>,

    /// Carried through to the worker untouched.
    pub payload: Payload,

    /// Number of times this item has been claimed.
    pub attempts: u32,

    /// The worker currently holding this item, if any.
    pub claim: Option<Claim>,

    /// Advisory only. Nothing compares it against `attempts`.
    pub max_retries: u32,
}

impl WorkItem {
    pub fn is_claimed(&self) -> bool {
        self.claim.is_some()
    }

    pub fn claimed_by(&self) -> Option<&str> {
        self.claim.as_ref().map(|c| c.worker_id.as_str())
    }

    pub fn claimed_at(&self) -> Option<DateTime<Utc>> {
        self.claim.as_ref().map(|c| c.claimed_at)
    }

    /// Whether the current claim is older than `max_age` at `now`.
    /// Unclaimed items are never stale.
    pub fn claim_is_stale(&self, max_age: std::time::Duration, now: DateTime<Utc>) -> bool {
        match &self.claim {
            Some(claim) => claim.age(now) > max_age,
            None => false,
        }
    }

    /// Priority after one failed attempt.
    pub fn degraded_priority(&self) -> u8 {
        self.priority.saturating_add(FAILURE_PENALTY).min(MAX_PRIORITY)
    }
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub String);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// A timestamped reservation of an item by one worker.
///
/// Holder and time travel together, so an item can never carry one without
/// the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub worker_id: String,
    pub claimed_at: DateTime<Utc>,
}

impl Claim {
    /// Age of the claim at `now`. Zero if the clock went backwards.
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.claimed_at).to_std().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// What the worker needs to run the request. Opaque to the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// The message to respond to.
    pub message: serde_json::Value,

    /// Conversation context lines.
    #[serde(default)]
    pub context: Vec<String>,

    /// Model the request should run against.
    #[serde(default)]
    pub model: Option<String>,

    /// Why the producer routed it here (shown on the dashboard).
    #[serde(default)]
    pub route_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for submitting work. Claim fields, attempts and the admission
/// time are filled in by the queue.
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub(crate) id: WorkId,
    pub(crate) priority: u8,
    pub(crate) payload: Payload,
    pub(crate) max_retries: u32,
}

impl NewWorkItem {
    pub fn new(id: impl Into<WorkId>) -> Self {
        Self {
            id: id.into(),
            priority: 50,
            payload: Payload::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Builder with a generated id.
    pub fn generated() -> Self {
        Self::new(WorkId::new())
    }

    pub fn id(&self) -> &WorkId {
        &self.id
    }

    /// Clamped to [`MAX_PRIORITY`].
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    pub fn message(mut self, message: serde_json::Value) -> Self {
        self.payload.message = message;
        self
    }

    pub fn context(mut self, context: Vec<String>) -> Self {
        self.payload.context = context;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.payload.model = Some(model.into());
        self
    }

    pub fn route_reason(mut self, reason: impl Into<String>) -> Self {
        self.payload.route_reason = Some(reason.into());
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Materialize an unclaimed item admitted at `now`.
    pub fn into_item(self, now: DateTime<Utc>) -> WorkItem {
        WorkItem {
            id: self.id,
            priority: self.priority,
            enqueued_at: now,
            payload: self.payload,
            attempts: 0,
            claim: None,
            max_retries: self.max_retries,
        }
    }
}
