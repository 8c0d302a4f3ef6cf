//! Presence broadcaster.
//!
//! For every recipient, the presence notification for an event is queued
//! before the system chat line for the same event.

use crate::observability::metrics;
use crate::room::registry::{Participant, ParticipantRegistry};
use crate::room::Delivery;

use chrono::{DateTime, Utc};
use room_protocol::{ChatKind, ChatMessage, ServerEvent};
use tracing::debug;

/// Announce a participant that has just been admitted.
///
/// 1. `user-joined` (live) to every other participant.
/// 2. One `user-joined` replay per existing participant to the joiner, in
///    registry order.
/// 3. "`<name>` joined the chat" to everyone, joiner included.
pub fn on_join(registry: &ParticipantRegistry, joiner: &Participant, now: DateTime<Utc>) -> Delivery {
    let mut delivery = Delivery::default();

    for other in registry
        .iter()
        .filter(|p| p.endpoint_id != joiner.endpoint_id)
    {
        delivery.deliver(
            other,
            ServerEvent::UserJoined {
                endpoint_id: joiner.endpoint_id,
                display_name: joiner.display_name.clone(),
                existing: false,
            },
        );
        delivery.deliver(
            joiner,
            ServerEvent::UserJoined {
                endpoint_id: other.endpoint_id,
                display_name: other.display_name.clone(),
                existing: true,
            },
        );
    }

    let line = ChatMessage::system(format!("{} joined the chat", joiner.display_name), now);
    broadcast_system(registry, &line, &mut delivery);

    debug!(
        target: "relay.room.presence",
        room_id = %registry.room_id(),
        endpoint_id = %joiner.endpoint_id,
        participants = registry.len(),
        delivered = delivery.delivered,
        "Join announced"
    );

    delivery
}

/// Announce a participant that has just been evicted.
///
/// `user-left` then "`<name>` left the chat" to every remaining participant.
pub fn on_leave(
    registry: &ParticipantRegistry,
    departed: &Participant,
    now: DateTime<Utc>,
) -> Delivery {
    let mut delivery = Delivery::default();

    for remaining in registry.iter() {
        delivery.deliver(
            remaining,
            ServerEvent::UserLeft {
                endpoint_id: departed.endpoint_id,
                display_name: departed.display_name.clone(),
            },
        );
    }

    let line = ChatMessage::system(format!("{} left the chat", departed.display_name), now);
    broadcast_system(registry, &line, &mut delivery);

    debug!(
        target: "relay.room.presence",
        room_id = %registry.room_id(),
        endpoint_id = %departed.endpoint_id,
        participants = registry.len(),
        delivered = delivery.delivered,
        "Leave announced"
    );

    delivery
}

fn broadcast_system(registry: &ParticipantRegistry, line: &ChatMessage, delivery: &mut Delivery) {
    for participant in registry.iter() {
        delivery.deliver(participant, ServerEvent::ChatMessage(line.clone()));
    }
    metrics::record_chat_message(ChatKind::System.as_str());
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::room::test_handle;
    use relay_test_utils::{TestChannel, TestParticipant};
    use room_protocol::RoomId;

    fn join(registry: &mut ParticipantRegistry, name: &str) -> (TestChannel, Delivery) {
        let channel = TestParticipant::new(name).open(16);
        let joiner = registry
            .admit(
                channel.endpoint_id(),
                name.to_string(),
                None,
                Utc::now(),
                test_handle(&channel),
            )
            .unwrap();
        let delivery = on_join(registry, &joiner, Utc::now());
        (channel, delivery)
    }

    #[test]
    fn test_first_joiner_gets_only_system_line() {
        let mut registry = ParticipantRegistry::new(RoomId::default());
        let (mut alice, delivery) = join(&mut registry, "alice");

        assert_eq!(delivery.delivered, 1);
        assert_eq!(
            alice.recorder.drain_described(),
            vec!["system:alice joined the chat"]
        );
    }

    #[test]
    fn test_join_order_per_recipient() {
        let mut registry = ParticipantRegistry::new(RoomId::default());
        let (mut b, _) = join(&mut registry, "bob");
        let (mut c, _) = join(&mut registry, "carol");
        b.recorder.drain();
        c.recorder.drain();

        let (mut a, delivery) = join(&mut registry, "alice");
        assert!(delivery.is_clean());

        for observer in [&mut b, &mut c] {
            assert_eq!(
                observer.recorder.drain_described(),
                vec!["joined:alice", "system:alice joined the chat"]
            );
        }
        assert_eq!(
            a.recorder.drain_described(),
            vec![
                "present:bob",
                "present:carol",
                "system:alice joined the chat"
            ]
        );
    }

    #[test]
    fn test_live_join_carries_joiner_identity() {
        let mut registry = ParticipantRegistry::new(RoomId::default());
        let (mut b, _) = join(&mut registry, "bob");
        b.recorder.drain();
        let (a, _) = join(&mut registry, "alice");

        assert!(b.recorder.drain().contains(&ServerEvent::UserJoined {
            endpoint_id: a.endpoint_id(),
            display_name: "alice".to_string(),
            existing: false,
        }));
    }

    #[test]
    fn test_leave_reaches_only_remaining() {
        let mut registry = ParticipantRegistry::new(RoomId::default());
        let (mut a, _) = join(&mut registry, "alice");
        let (mut b, _) = join(&mut registry, "bob");
        a.recorder.drain();
        b.recorder.drain();

        let departed = registry.evict(b.endpoint_id()).unwrap();
        let delivery = on_leave(&registry, &departed, Utc::now());
        assert_eq!(delivery.delivered, 2);

        assert_eq!(
            a.recorder.drain_described(),
            vec!["left:bob", "system:bob left the chat"]
        );
        assert!(b.recorder.drain().is_empty());
    }

    #[test]
    fn test_closed_recipient_reported_as_failed() {
        let mut registry = ParticipantRegistry::new(RoomId::default());
        let (mut b, _) = join(&mut registry, "bob");
        b.close_receiver();

        let (_a, delivery) = join(&mut registry, "alice");
        assert_eq!(delivery.failed, vec![b.endpoint_id()]);
    }
}
