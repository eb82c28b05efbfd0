//! Work item span helpers.
//!
//! One span per claimed item, covering node selection through completion,
//! with state transitions recorded as events on it.

use tracing::Span;

use crate::model::WorkId;

/// Start a span for processing one claimed item.
///
/// The `item.state` field starts empty and is updated by
/// [`record_state_transition`].
pub fn start_item_span(id: &WorkId, worker_id: &str, priority: u8, attempt: u32) -> Span {
    tracing::info_span!(
        "item.process",
        "item.id" = %id,
        "item.worker" = worker_id,
        "item.priority" = priority,
        "item.attempt" = attempt,
        "item.state" = tracing::field::Empty,
    )
}

/// Record a state transition on `span` and emit it as an `info` event.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("item.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
