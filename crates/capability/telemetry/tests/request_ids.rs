use bearing_telemetry::{new_request_ids, TelemetryMetrics};

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
    assert_ne!(ids.request_id, ids.trace_id);
}

#[test]
fn fresh_metrics_start_at_zero() {
    let snapshot = TelemetryMetrics::new().snapshot();
    assert_eq!(snapshot.raw_messages, 0);
    assert_eq!(snapshot.events_delivered, 0);
    assert_eq!(snapshot.queue_depth_peak, 0);
}
