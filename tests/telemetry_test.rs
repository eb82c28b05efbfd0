//! Integration tests for telemetry initialization and span helpers.

use admitq::model::WorkId;
use admitq::telemetry::{TelemetryConfig, init_telemetry, metrics, work};
use opentelemetry::KeyValue;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Only one global subscriber per process; a second init in the same
    // process returns Err, which is fine here.
    let config = TelemetryConfig {
        service_name: "admitq-test".to_string(),
        ..Default::default()
    };
    if let Ok(guard) = init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn item_span_records_transitions() {
    let id = WorkId::from("msg-1");
    let span = work::start_item_span(&id, "worker-0", 20, 1);
    work::record_state_transition(&span, "queued", "claimed");
    work::record_state_transition(&span, "claimed", "completed");
}

#[test]
fn metric_instruments_work_without_a_provider() {
    metrics::items_enqueued().add(1, &[]);
    metrics::queue_depth().add(-1, &[]);
    metrics::wait_time_ms().record(12.5, &[]);
    metrics::item_priority().record(42, &[KeyValue::new("band", "medium")]);
    metrics::items_removed().add(2, &[KeyValue::new("reason", "purge")]);
}
