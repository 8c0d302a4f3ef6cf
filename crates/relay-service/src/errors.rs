//! Relay error types.
//!
//! None of these are fatal to the relay. Every variant is either absorbed as
//! an expected join/leave race or leads to eviction of the affected endpoint.
//! There is no error channel back to end users.

use room_protocol::{EndpointId, RoomId};
use thiserror::Error;

/// Relay error type.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A second `join` arrived on an already admitted channel. First admission wins.
    #[error("Endpoint already joined: {0}")]
    DuplicateEndpoint(EndpointId),

    /// Evict or lookup of an endpoint that is not registered.
    #[error("Participant not found: {0}")]
    NotFound(EndpointId),

    /// Chat or signaling from an endpoint that has not joined or already left.
    #[error("Unknown sender: {0}")]
    UnknownSender(EndpointId),

    /// Signaling addressed to an endpoint that is not registered.
    #[error("Unknown target: {0}")]
    UnknownTarget(EndpointId),

    /// Outbound queue of a channel is full or closed.
    #[error("Channel write failed for {endpoint_id}: {reason}")]
    ChannelWriteFailure {
        endpoint_id: EndpointId,
        reason: &'static str,
    },

    /// User chat line with no content.
    #[error("Chat message is empty")]
    EmptyMessage,

    /// Join with a blank display name.
    #[error("Display name is empty")]
    InvalidDisplayName,

    /// Room participant limit reached.
    #[error("Room at capacity: {0}")]
    RoomFull(RoomId),

    /// Relay is shutting down and not accepting channels.
    #[error("Relay is draining")]
    Draining,

    /// Actor mailbox or response channel failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns a bounded label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            RelayError::DuplicateEndpoint(_) => "duplicate_endpoint",
            RelayError::NotFound(_) => "not_found",
            RelayError::UnknownSender(_) => "unknown_sender",
            RelayError::UnknownTarget(_) => "unknown_target",
            RelayError::ChannelWriteFailure { .. } => "channel_write_failure",
            RelayError::EmptyMessage => "empty_message",
            RelayError::InvalidDisplayName => "invalid_display_name",
            RelayError::RoomFull(_) => "room_full",
            RelayError::Draining => "draining",
            RelayError::Internal(_) => "internal",
        }
    }

    /// Whether this is a normal outcome of clients joining and leaving
    /// concurrently, which is logged at debug level only.
    #[must_use]
    pub const fn is_expected_race(&self) -> bool {
        matches!(
            self,
            RelayError::DuplicateEndpoint(_)
                | RelayError::NotFound(_)
                | RelayError::UnknownSender(_)
                | RelayError::UnknownTarget(_)
        )
    }

    /// Returns a client-safe message (no internal details), used as the
    /// WebSocket close reason.
    #[must_use]
    pub const fn client_message(&self) -> &'static str {
        match self {
            RelayError::RoomFull(_) => "Room is at capacity",
            RelayError::Draining => "Server is shutting down, please reconnect",
            RelayError::DuplicateEndpoint(_) => "Already joined",
            RelayError::InvalidDisplayName => "Display name is required",
            RelayError::EmptyMessage => "Message is empty",
            RelayError::NotFound(_)
            | RelayError::UnknownSender(_)
            | RelayError::UnknownTarget(_)
            | RelayError::ChannelWriteFailure { .. }
            | RelayError::Internal(_) => "An internal error occurred",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_labels() {
        let id = EndpointId::new();
        assert_eq!(RelayError::UnknownTarget(id).reason(), "unknown_target");
        assert_eq!(RelayError::UnknownSender(id).reason(), "unknown_sender");
        assert_eq!(
            RelayError::ChannelWriteFailure {
                endpoint_id: id,
                reason: "queue full",
            }
            .reason(),
            "channel_write_failure"
        );
        assert_eq!(RelayError::RoomFull(RoomId::default()).reason(), "room_full");
    }

    #[test]
    fn test_expected_races() {
        let id = EndpointId::new();
        assert!(RelayError::DuplicateEndpoint(id).is_expected_race());
        assert!(RelayError::NotFound(id).is_expected_race());
        assert!(RelayError::UnknownTarget(id).is_expected_race());
        assert!(!RelayError::EmptyMessage.is_expected_race());
        assert!(!RelayError::ChannelWriteFailure {
            endpoint_id: id,
            reason: "channel closed",
        }
        .is_expected_race());
    }

    #[test]
    fn test_error_display() {
        let id = EndpointId::new();
        assert_eq!(
            RelayError::NotFound(id).to_string(),
            format!("Participant not found: {id}")
        );
        assert_eq!(RelayError::Draining.to_string(), "Relay is draining");
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let internal = RelayError::Internal("channel send failed: mailbox closed".to_string());
        assert_eq!(internal.client_message(), "An internal error occurred");

        let write = RelayError::ChannelWriteFailure {
            endpoint_id: EndpointId::new(),
            reason: "queue full",
        };
        assert!(!write.client_message().contains("queue"));

        assert_eq!(
            RelayError::Draining.client_message(),
            "Server is shutting down, please reconnect"
        );
    }
}
