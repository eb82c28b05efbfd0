//! Metric instrument factories for admitq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op and these cost
//! next to nothing.

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};

/// Returns the shared meter for admitq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("admitq")
}

/// Counter: items admitted to the queue.
pub fn items_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("admitq.queue.enqueued")
        .with_description("Number of work items admitted")
        .build()
}

/// Counter: successful claims.
pub fn items_claimed() -> Counter<u64> {
    meter()
        .u64_counter("admitq.queue.claimed")
        .with_description("Number of work items claimed by workers")
        .build()
}

/// Counter: completions reported by workers.
/// Labels: `result` ("ok" | "requeued").
pub fn items_completed() -> Counter<u64> {
    meter()
        .u64_counter("admitq.queue.completed")
        .with_description("Number of completions reported by workers")
        .build()
}

/// Counter: items removed without completing.
/// Labels: `reason` ("delete" | "purge" | "clear").
pub fn items_removed() -> Counter<u64> {
    meter()
        .u64_counter("admitq.queue.removed")
        .with_description("Number of work items removed or purged")
        .build()
}

/// Counter: claims released by the stale-claim reaper.
pub fn stale_claims_released() -> Counter<u64> {
    meter()
        .u64_counter("admitq.queue.stale_released")
        .with_description("Number of stale claims returned to the pool")
        .build()
}

/// Up/down counter: items currently queued.
pub fn queue_depth() -> UpDownCounter<i64> {
    meter()
        .i64_up_down_counter("admitq.queue.depth")
        .with_description("Work items currently queued")
        .build()
}

/// Histogram: time from admission to claim in milliseconds.
pub fn wait_time_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("admitq.queue.wait_ms")
        .with_description("Time from admission to claim")
        .with_unit("ms")
        .build()
}

/// Histogram: priority of admitted items.
/// Labels: `band` ("critical" | "high" | "medium" | "low" | "background").
pub fn item_priority() -> Histogram<u64> {
    meter()
        .u64_histogram("admitq.queue.priority")
        .with_description("Priority of admitted work items")
        .build()
}
