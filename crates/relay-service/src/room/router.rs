//! Signaling router.
//!
//! Forwards offer/answer/candidate envelopes between two registered
//! endpoints. Payloads are passed through untouched and never inspected.
//! Nothing here blocks or retries.

use crate::errors::RelayError;
use crate::observability::metrics;
use crate::room::registry::ParticipantRegistry;

use room_protocol::{EndpointId, ServerEvent, SignalingEnvelope};
use tracing::{debug, trace};

/// Route one envelope from `from` to its target.
///
/// Any sender id already on the envelope is overwritten with `from`.
///
/// # Errors
///
/// - `UnknownSender` if `from` has not joined
/// - `UnknownTarget` if the target is not registered
/// - `ChannelWriteFailure` if the target's queue rejected the event; the
///   caller schedules the target for eviction
pub fn route(
    registry: &ParticipantRegistry,
    mut envelope: SignalingEnvelope,
    from: EndpointId,
) -> Result<(), RelayError> {
    let result = forward(registry, &mut envelope, from);

    match &result {
        Ok(()) => {
            metrics::record_signaling_routed(envelope.kind.as_str());
            trace!(
                target: "relay.room.router",
                kind = envelope.kind.as_str(),
                from = %from,
                to = %envelope.target_endpoint_id,
                "Signal forwarded"
            );
        }
        Err(e) => {
            metrics::record_signaling_dropped(e.reason());
            debug!(
                target: "relay.room.router",
                kind = envelope.kind.as_str(),
                from = %from,
                to = %envelope.target_endpoint_id,
                reason = e.reason(),
                "Signal dropped"
            );
        }
    }

    result
}

fn forward(
    registry: &ParticipantRegistry,
    envelope: &mut SignalingEnvelope,
    from: EndpointId,
) -> Result<(), RelayError> {
    if !registry.contains(from) {
        return Err(RelayError::UnknownSender(from));
    }
    envelope.from_endpoint_id = Some(from);

    let target = registry
        .lookup(envelope.target_endpoint_id)
        .map_err(|_| RelayError::UnknownTarget(envelope.target_endpoint_id))?;

    let event = ServerEvent::signal(envelope.kind, from, envelope.payload.clone());
    target.channel.send(event)
}
