//! Relay channel handle.
//!
//! The room core only sees a channel as an addressable endpoint with a
//! bounded outbound queue. The transport owns the other end of the queue
//! and drains it into the socket.

use crate::errors::RelayError;

use room_protocol::{EndpointId, ServerEvent};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Handle for writing to one relay channel.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    endpoint_id: EndpointId,
    sender: mpsc::Sender<ServerEvent>,
    cancel_token: CancellationToken,
}

impl ChannelHandle {
    #[must_use]
    pub fn new(
        endpoint_id: EndpointId,
        sender: mpsc::Sender<ServerEvent>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            endpoint_id,
            sender,
            cancel_token,
        }
    }

    /// Create a handle together with the receiving end of its outbound queue.
    #[must_use]
    pub fn channel(
        endpoint_id: EndpointId,
        buffer: usize,
        cancel_token: CancellationToken,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self::new(endpoint_id, sender, cancel_token), receiver)
    }

    #[must_use]
    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    /// Queue one event without waiting.
    ///
    /// # Errors
    ///
    /// Returns `ChannelWriteFailure` if the queue is full or the writer is gone.
    pub fn send(&self, event: ServerEvent) -> Result<(), RelayError> {
        self.sender.try_send(event).map_err(|e| {
            let reason = match e {
                TrySendError::Full(_) => "queue full",
                TrySendError::Closed(_) => "channel closed",
            };
            RelayError::ChannelWriteFailure {
                endpoint_id: self.endpoint_id,
                reason,
            }
        })
    }

    /// Ask the transport to close the socket.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled() || self.sender.is_closed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_delivers_in_order() {
        let (handle, mut rx) = ChannelHandle::channel(EndpointId::new(), 4, CancellationToken::new());
        let id = handle.endpoint_id();

        handle
            .send(ServerEvent::UserLeft {
                endpoint_id: id,
                display_name: "a".to_string(),
            })
            .unwrap();
        handle
            .send(ServerEvent::UserLeft {
                endpoint_id: id,
                display_name: "b".to_string(),
            })
            .unwrap();

        assert!(matches!(rx.recv().await, Some(ServerEvent::UserLeft { display_name, .. }) if display_name == "a"));
        assert!(matches!(rx.recv().await, Some(ServerEvent::UserLeft { display_name, .. }) if display_name == "b"));
    }

    #[tokio::test]
    async fn test_full_queue_is_write_failure() {
        let (handle, _rx) = ChannelHandle::channel(EndpointId::new(), 1, CancellationToken::new());
        let event = ServerEvent::Welcome {
            endpoint_id: handle.endpoint_id(),
            room_id: room_protocol::RoomId::default(),
        };

        handle.send(event.clone()).unwrap();
        let err = handle.send(event).unwrap_err();
        assert!(matches!(
            err,
            RelayError::ChannelWriteFailure {
                reason: "queue full",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_write_failure() {
        let (handle, rx) = ChannelHandle::channel(EndpointId::new(), 4, CancellationToken::new());
        drop(rx);

        assert!(handle.is_closed());
        let err = handle
            .send(ServerEvent::Welcome {
                endpoint_id: handle.endpoint_id(),
                room_id: room_protocol::RoomId::default(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::ChannelWriteFailure {
                reason: "channel closed",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_close_cancels_token() {
        let token = CancellationToken::new();
        let (handle, _rx) = ChannelHandle::channel(EndpointId::new(), 4, token.clone());

        assert!(!handle.is_closed());
        handle.close();
        assert!(token.is_cancelled());
        assert!(handle.is_closed());
    }
}
