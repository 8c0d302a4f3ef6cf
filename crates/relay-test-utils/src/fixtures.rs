//! Participant fixtures.

use room_protocol::{ClientEvent, EndpointId, ServerEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::recorder::EventRecorder;

/// Test participant fixture.
#[derive(Debug, Clone)]
pub struct TestParticipant {
    pub endpoint_id: EndpointId,
    pub name: String,
    pub user_id: Option<String>,
}

impl TestParticipant {
    /// Create a new test participant with the given display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            endpoint_id: EndpointId::new(),
            name: name.into(),
            user_id: None,
        }
    }

    /// Attach an external user id.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set an explicit endpoint id (for reproducible tests).
    #[must_use]
    pub fn with_endpoint_id(mut self, endpoint_id: EndpointId) -> Self {
        self.endpoint_id = endpoint_id;
        self
    }

    /// The `join` event this participant would send.
    #[must_use]
    pub fn join_event(&self) -> ClientEvent {
        ClientEvent::Join {
            display_name: self.name.clone(),
            user_id: self.user_id.clone(),
        }
    }

    /// Open an in-memory outbound queue for this participant.
    #[must_use]
    pub fn open(self, buffer: usize) -> TestChannel {
        let (sender, receiver) = mpsc::channel(buffer);
        TestChannel {
            recorder: EventRecorder::new(self.endpoint_id, receiver),
            participant: self,
            sender,
            cancel_token: CancellationToken::new(),
        }
    }
}

/// A participant with the two ends of its outbound queue.
#[derive(Debug)]
pub struct TestChannel {
    pub participant: TestParticipant,
    /// Writer side, handed to the code under test.
    pub sender: mpsc::Sender<ServerEvent>,
    /// Cancelled by the code under test when it wants the socket closed.
    pub cancel_token: CancellationToken,
    pub recorder: EventRecorder,
}

impl TestChannel {
    #[must_use]
    pub fn endpoint_id(&self) -> EndpointId {
        self.participant.endpoint_id
    }

    /// Simulate the socket writer going away.
    pub fn close_receiver(&mut self) {
        self.recorder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_builder() {
        let id = EndpointId::new();
        let participant = TestParticipant::new("alice")
            .with_user_id("user-1")
            .with_endpoint_id(id);

        assert_eq!(participant.endpoint_id, id);
        assert_eq!(
            participant.join_event(),
            ClientEvent::Join {
                display_name: "alice".to_string(),
                user_id: Some("user-1".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_open_wires_queue_to_recorder() {
        let mut channel = TestParticipant::new("bob").open(4);
        let id = channel.endpoint_id();

        channel
            .sender
            .try_send(ServerEvent::UserLeft {
                endpoint_id: id,
                display_name: "bob".to_string(),
            })
            .unwrap();
        assert_eq!(channel.recorder.drain_described(), vec!["left:bob"]);

        channel.close_receiver();
        assert!(channel.sender.is_closed());
    }
}
