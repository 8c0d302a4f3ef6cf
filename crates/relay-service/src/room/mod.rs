//! Room core: registry, signaling router, presence broadcaster and chat fan-out.
//!
//! Everything here is synchronous and lock-free. It runs inside a single
//! room actor, which processes one channel event to completion before the
//! next. Outbound writes never block; a write that fails is reported back
//! so the actor can evict the endpoint.

pub mod channel;
pub mod chat;
pub mod presence;
pub mod registry;
pub mod router;

pub use channel::ChannelHandle;
pub use registry::{Participant, ParticipantInfo, ParticipantRegistry};

use crate::observability::metrics;

use room_protocol::{EndpointId, ServerEvent};
use tracing::warn;

/// Outcome of a fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Events queued successfully.
    pub delivered: usize,
    /// Endpoints whose queue rejected an event, in the order they failed.
    pub failed: Vec<EndpointId>,
}

impl Delivery {
    /// Queue `event` on the participant's channel, recording a failure
    /// instead of propagating it.
    pub(crate) fn deliver(&mut self, participant: &Participant, event: ServerEvent) {
        let event_name = event.name();
        match participant.channel.send(event) {
            Ok(()) => self.delivered += 1,
            Err(e) => {
                warn!(
                    target: "relay.room",
                    endpoint_id = %participant.endpoint_id,
                    event = event_name,
                    error = %e,
                    "Outbound write failed, scheduling eviction"
                );
                metrics::record_channel_write_failure();
                if !self.failed.contains(&participant.endpoint_id) {
                    self.failed.push(participant.endpoint_id);
                }
            }
        }
    }

    /// Fold another outcome into this one.
    pub fn merge(&mut self, other: Delivery) {
        self.delivered += other.delivered;
        for id in other.failed {
            if !self.failed.contains(&id) {
                self.failed.push(id);
            }
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Channel handle writing into a test participant's recorder.
#[cfg(test)]
pub(crate) fn test_handle(channel: &relay_test_utils::TestChannel) -> ChannelHandle {
    ChannelHandle::new(
        channel.endpoint_id(),
        channel.sender.clone(),
        channel.cancel_token.clone(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_deduplicates_failures() {
        let a = EndpointId::new();
        let b = EndpointId::new();
        let mut first = Delivery {
            delivered: 2,
            failed: vec![a],
        };
        first.merge(Delivery {
            delivered: 3,
            failed: vec![a, b],
        });

        assert_eq!(first.delivered, 5);
        assert_eq!(first.failed, vec![a, b]);
        assert!(!first.is_clean());
        assert!(Delivery::default().is_clean());
    }
}
