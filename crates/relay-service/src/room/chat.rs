//! Chat fan-out.

use crate::errors::RelayError;
use crate::observability::metrics;
use crate::room::registry::ParticipantRegistry;
use crate::room::Delivery;

use chrono::{DateTime, Utc};
use room_protocol::{ChatKind, ChatMessage, EndpointId, ServerEvent};
use tracing::debug;

/// Stamp a user chat line with the sender's registered name and the server
/// clock, then deliver it to every participant, the sender included.
///
/// # Errors
///
/// - `UnknownSender` if the sender has not joined
/// - `EmptyMessage` if the content is blank after trimming
pub fn publish(
    registry: &ParticipantRegistry,
    sender: EndpointId,
    content: &str,
    now: DateTime<Utc>,
) -> Result<(ChatMessage, Delivery), RelayError> {
    let participant = registry
        .lookup(sender)
        .map_err(|_| RelayError::UnknownSender(sender))?;

    let content = content.trim();
    if content.is_empty() {
        return Err(RelayError::EmptyMessage);
    }

    let message = ChatMessage::user(content, participant.display_name.clone(), sender, now);
    let mut delivery = Delivery::default();
    for recipient in registry.iter() {
        delivery.deliver(recipient, ServerEvent::ChatMessage(message.clone()));
    }
    metrics::record_chat_message(ChatKind::User.as_str());

    debug!(
        target: "relay.room.chat",
        room_id = %registry.room_id(),
        sender = %sender,
        delivered = delivery.delivered,
        "Chat line fanned out"
    );

    Ok((message, delivery))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::room::test_handle;
    use relay_test_utils::{TestChannel, TestParticipant};
    use room_protocol::RoomId;

    fn admit(registry: &mut ParticipantRegistry, name: &str) -> TestChannel {
        let channel = TestParticipant::new(name).open(16);
        registry
            .admit(
                channel.endpoint_id(),
                name.to_string(),
                None,
                Utc::now(),
                test_handle(&channel),
            )
            .unwrap();
        channel
    }

    #[test]
    fn test_publish_reaches_everyone_including_sender() {
        let mut registry = ParticipantRegistry::new(RoomId::default());
        let mut a = admit(&mut registry, "alice");
        let mut b = admit(&mut registry, "bob");

        let (message, delivery) =
            publish(&registry, a.endpoint_id(), "  hello there ", Utc::now()).unwrap();

        assert_eq!(delivery.delivered, 2);
        assert_eq!(message.content, "hello there");
        assert_eq!(message.display_name.as_deref(), Some("alice"));
        assert_eq!(message.sender_endpoint_id, Some(a.endpoint_id()));
        assert_eq!(a.recorder.drain_described(), vec!["chat:alice:hello there"]);
        assert_eq!(b.recorder.drain_described(), vec!["chat:alice:hello there"]);
    }

    #[test]
    fn test_unknown_sender_is_dropped() {
        let mut registry = ParticipantRegistry::new(RoomId::default());
        let mut a = admit(&mut registry, "alice");

        let stranger = EndpointId::new();
        let err = publish(&registry, stranger, "hi", Utc::now()).unwrap_err();
        assert!(matches!(err, RelayError::UnknownSender(id) if id == stranger));
        assert!(a.recorder.drain().is_empty());
    }

    #[test]
    fn test_blank_message_is_dropped() {
        let mut registry = ParticipantRegistry::new(RoomId::default());
        let mut a = admit(&mut registry, "alice");

        let err = publish(&registry, a.endpoint_id(), " \n\t ", Utc::now()).unwrap_err();
        assert!(matches!(err, RelayError::EmptyMessage));
        assert!(a.recorder.drain().is_empty());
    }

    #[test]
    fn test_timestamp_is_server_clock() {
        let mut registry = ParticipantRegistry::new(RoomId::default());
        let a = admit(&mut registry, "alice");
        let now = Utc::now();

        let (message, _) = publish(&registry, a.endpoint_id(), "hi", now).unwrap();
        assert_eq!(message.timestamp, now);
        assert_eq!(message.kind, ChatKind::User);
    }
}
