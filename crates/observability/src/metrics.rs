//! Pipeline metric registration
//!
//! The pipeline crates emit counters at their call sites; this module only
//! attaches descriptions so the Prometheus endpoint is self-documenting.
//!
//! Counters:
//! - `records_emitted_total{source}`: records delivered into a fan-out
//! - `sink_write_failures_total{sink}`: failed sink writes
//! - `tap_reconnects_total{source, reason}`: stream session restarts
//! - `queue_deliveries_total{source}`: queue messages received
//! - `queue_acks_total{source}` / `queue_nacks_total{source}`: queue outcomes

use metrics::describe_counter;

/// Register descriptions for all pipeline counters.
///
/// Must run after the metrics recorder is installed.
pub fn describe_pipeline_metrics() {
    describe_counter!(
        "records_emitted_total",
        "Records delivered into a tap's fan-out, labeled by source"
    );
    describe_counter!(
        "sink_write_failures_total",
        "Sink writes that returned an error, labeled by sink"
    );
    describe_counter!(
        "tap_reconnects_total",
        "Streaming session restarts, labeled by source and reason"
    );
    describe_counter!(
        "queue_deliveries_total",
        "Queue messages received, labeled by source"
    );
    describe_counter!(
        "queue_acks_total",
        "Queue messages positively acknowledged, labeled by source"
    );
    describe_counter!(
        "queue_nacks_total",
        "Queue messages returned for redelivery, labeled by source"
    );
}
