//! Metrics definitions for the room relay.
//!
//! All metrics follow Prometheus naming conventions:
//! - `relay_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `actor_type`: 2 values (controller, room)
//! - `type`: 3 values (offer, answer, candidate)
//! - `reason`: bounded by `RelayError::reason()`
//! - `kind`: 2 values (system, user)
//! - `event`: bounded by client event names (~7 values)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Room event handling is in-memory fan-out, expected well under 10ms
        .set_buckets_for_metric(
            Matcher::Prefix("relay_event".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set event latency buckets: {e}"))?
        // Channel lifetimes range from seconds to hours
        .set_buckets_for_metric(
            Matcher::Prefix("relay_channel_duration".to_string()),
            &[
                1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0,
            ],
        )
        .map_err(|e| format!("Failed to set channel duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Connection, Room & Participant Metrics (Gauges)
// ============================================================================

/// Set the number of open relay channels.
///
/// Metric: `relay_connections_active`
pub fn set_connections_active(count: u64) {
    // u64 to f64 conversion is safe for realistic connection counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_connections_active").set(count as f64);
}

/// Set the number of live rooms.
///
/// Metric: `relay_rooms_active`
pub fn set_rooms_active(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_rooms_active").set(count as f64);
}

/// Set the number of joined participants across all rooms.
///
/// Metric: `relay_participants_active`
pub fn set_participants_active(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_participants_active").set(count as f64);
}

/// Set the mailbox depth for an actor type.
///
/// Metric: `relay_actor_mailbox_depth`
/// Labels: `actor_type` (controller, room)
///
/// High values indicate the actor is falling behind.
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    // usize to f64 conversion is safe for realistic mailbox depths
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

// ============================================================================
// Room Traffic Metrics (Counters)
// ============================================================================

/// Record a signaling envelope forwarded to its target.
///
/// Metric: `relay_signaling_routed_total`
/// Labels: `type` (offer, answer, candidate)
pub fn record_signaling_routed(signal_type: &str) {
    counter!("relay_signaling_routed_total", "type" => signal_type.to_string()).increment(1);
}

/// Record a signaling envelope that was not delivered.
///
/// Metric: `relay_signaling_dropped_total`
/// Labels: `reason` (unknown_target, unknown_sender, channel_write_failure)
pub fn record_signaling_dropped(reason: &str) {
    counter!("relay_signaling_dropped_total", "reason" => reason.to_string()).increment(1);
}

/// Record a chat line fanned out to a room.
///
/// Metric: `relay_chat_messages_total`
/// Labels: `kind` (system, user)
pub fn record_chat_message(kind: &str) {
    counter!("relay_chat_messages_total", "kind" => kind.to_string()).increment(1);
}

/// Record a failed write into a channel's outbound queue.
///
/// Metric: `relay_channel_write_failures_total`
///
/// Every failure schedules the endpoint for eviction.
pub fn record_channel_write_failure() {
    counter!("relay_channel_write_failures_total").increment(1);
}

/// Record an inbound frame that could not be decoded.
///
/// Metric: `relay_frames_rejected_total`
pub fn record_frame_rejected() {
    counter!("relay_frames_rejected_total").increment(1);
}

/// Record an actor panic event.
///
/// Metric: `relay_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug.
pub fn record_actor_panic(actor_type: &str) {
    counter!("relay_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}

// ============================================================================
// Latency Metrics (Histograms)
// ============================================================================

/// Record how long the room actor spent handling one client event.
///
/// Metric: `relay_event_latency_seconds`
/// Labels: `event`
pub fn record_event_latency(event: &str, duration: Duration) {
    histogram!("relay_event_latency_seconds", "event" => event.to_string())
        .record(duration.as_secs_f64());
}

/// Record the lifetime of a closed relay channel.
///
/// Metric: `relay_channel_duration_seconds`
pub fn record_channel_duration(duration: Duration) {
    histogram!("relay_channel_duration_seconds").record(duration.as_secs_f64());
}
