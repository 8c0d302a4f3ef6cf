//! Client and server event types.
//!
//! Field names on the wire are camelCase and the `type` tag is kebab-case,
//! matching what the browser desktop already speaks.

use crate::ids::{EndpointId, RoomId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of connection-negotiation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Session description offer
    Offer,
    /// Session description answer
    Answer,
    /// ICE candidate
    Candidate,
}

impl SignalKind {
    /// Returns the kind as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
        }
    }
}

/// Origin of a chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// Synthesized by the relay (join/leave announcements)
    System,
    /// Written by a participant
    User,
}

impl ChatKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChatKind::System => "system",
            ChatKind::User => "user",
        }
    }
}

/// A chat line as fanned out by the relay.
///
/// `display_name` and `timestamp` are always stamped server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub kind: ChatKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_endpoint_id: Option<EndpointId>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a relay-generated line.
    #[must_use]
    pub fn system(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: ChatKind::System,
            content: content.into(),
            display_name: None,
            sender_endpoint_id: None,
            timestamp,
        }
    }

    /// Build a participant line.
    #[must_use]
    pub fn user(
        content: impl Into<String>,
        display_name: impl Into<String>,
        sender: EndpointId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: ChatKind::User,
            content: content.into(),
            display_name: Some(display_name.into()),
            sender_endpoint_id: Some(sender),
            timestamp,
        }
    }
}

/// Events a client sends to the relay.
///
/// Any `fromEndpointId` a client puts on a signaling event is not part of
/// this type and is discarded during decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Announce identity and enter the room.
    Join {
        display_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// Leave the room but keep the channel open.
    Leave,
    /// Publish a chat line.
    ChatMessage { content: String },
    Offer {
        target_endpoint_id: EndpointId,
        payload: Value,
    },
    Answer {
        target_endpoint_id: EndpointId,
        payload: Value,
    },
    #[serde(alias = "ice-candidate")]
    Candidate {
        target_endpoint_id: EndpointId,
        payload: Value,
    },
}

impl ClientEvent {
    /// Build a signaling event of the given kind.
    #[must_use]
    pub fn signal(kind: SignalKind, target_endpoint_id: EndpointId, payload: Value) -> Self {
        match kind {
            SignalKind::Offer => ClientEvent::Offer {
                target_endpoint_id,
                payload,
            },
            SignalKind::Answer => ClientEvent::Answer {
                target_endpoint_id,
                payload,
            },
            SignalKind::Candidate => ClientEvent::Candidate {
                target_endpoint_id,
                payload,
            },
        }
    }

    /// Wire name of the event, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "join",
            ClientEvent::Leave => "leave",
            ClientEvent::ChatMessage { .. } => "chat-message",
            ClientEvent::Offer { .. } => "offer",
            ClientEvent::Answer { .. } => "answer",
            ClientEvent::Candidate { .. } => "candidate",
        }
    }
}

/// Events the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// First event on every channel: tells the client its own identity.
    Welcome {
        endpoint_id: EndpointId,
        room_id: RoomId,
    },
    /// A participant is present. `existing` is true for the roster replay a
    /// joiner receives about participants that were already in the room.
    UserJoined {
        endpoint_id: EndpointId,
        display_name: String,
        #[serde(default)]
        existing: bool,
    },
    UserLeft {
        endpoint_id: EndpointId,
        display_name: String,
    },
    ChatMessage(ChatMessage),
    Offer {
        from_endpoint_id: EndpointId,
        payload: Value,
    },
    Answer {
        from_endpoint_id: EndpointId,
        payload: Value,
    },
    Candidate {
        from_endpoint_id: EndpointId,
        payload: Value,
    },
}

impl ServerEvent {
    /// Build a forwarded signaling event of the given kind.
    #[must_use]
    pub fn signal(kind: SignalKind, from_endpoint_id: EndpointId, payload: Value) -> Self {
        match kind {
            SignalKind::Offer => ServerEvent::Offer {
                from_endpoint_id,
                payload,
            },
            SignalKind::Answer => ServerEvent::Answer {
                from_endpoint_id,
                payload,
            },
            SignalKind::Candidate => ServerEvent::Candidate {
                from_endpoint_id,
                payload,
            },
        }
    }

    /// Wire name of the event, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => "welcome",
            ServerEvent::UserJoined { .. } => "user-joined",
            ServerEvent::UserLeft { .. } => "user-left",
            ServerEvent::ChatMessage(_) => "chat-message",
            ServerEvent::Offer { .. } => "offer",
            ServerEvent::Answer { .. } => "answer",
            ServerEvent::Candidate { .. } => "candidate",
        }
    }
}

/// A targeted negotiation message inside the relay.
///
/// `from_endpoint_id` is only ever filled in by the router.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalingEnvelope {
    pub kind: SignalKind,
    pub target_endpoint_id: EndpointId,
    pub from_endpoint_id: Option<EndpointId>,
    pub payload: Value,
}

impl SignalingEnvelope {
    #[must_use]
    pub fn new(kind: SignalKind, target_endpoint_id: EndpointId, payload: Value) -> Self {
        Self {
            kind,
            target_endpoint_id,
            from_endpoint_id: None,
            payload,
        }
    }

    /// The event delivered to the target, or `None` if no sender was stamped.
    #[must_use]
    pub fn to_server_event(&self) -> Option<ServerEvent> {
        self.from_endpoint_id
            .map(|from| ServerEvent::signal(self.kind, from, self.payload.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signal_constructors_match_kind() {
        let target = EndpointId::new();
        let event = ClientEvent::signal(SignalKind::Answer, target, json!({"sdp": "x"}));
        assert!(matches!(event, ClientEvent::Answer { .. }));
        assert_eq!(event.name(), "answer");

        let from = EndpointId::new();
        let event = ServerEvent::signal(SignalKind::Candidate, from, json!(null));
        assert_eq!(event.name(), "candidate");
    }

    #[test]
    fn test_envelope_without_sender_has_no_server_event() {
        let mut envelope =
            SignalingEnvelope::new(SignalKind::Offer, EndpointId::new(), json!({"sdp": "v=0"}));
        assert!(envelope.to_server_event().is_none());

        let from = EndpointId::new();
        envelope.from_endpoint_id = Some(from);
        assert_eq!(
            envelope.to_server_event(),
            Some(ServerEvent::Offer {
                from_endpoint_id: from,
                payload: json!({"sdp": "v=0"}),
            })
        );
    }

    #[test]
    fn test_system_message_has_no_sender() {
        let message = ChatMessage::system("alice joined the chat", Utc::now());
        assert_eq!(message.kind, ChatKind::System);
        assert!(message.display_name.is_none());
        assert!(message.sender_endpoint_id.is_none());
    }
}
