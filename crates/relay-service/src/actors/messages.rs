//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via `tokio::sync::mpsc`.
//! Response patterns use `tokio::sync::oneshot` for request-reply semantics.

use crate::errors::RelayError;
use crate::room::{ChannelHandle, ParticipantInfo};

use super::room::RoomActorHandle;

use room_protocol::{ClientEvent, EndpointId, RoomId};
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `RoomControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Attach a freshly opened channel to a room, creating the room if needed.
    OpenChannel {
        room_id: RoomId,
        channel: ChannelHandle,
        /// Handle of the room the channel now belongs to.
        respond_to: oneshot::Sender<Result<RoomActorHandle, RelayError>>,
    },

    /// Sent by a room when its last channel has closed.
    RoomIdle { room_id: RoomId },

    /// Get current status (for health checks and tests).
    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },

    /// Stop accepting channels and cancel every room.
    Shutdown {
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), RelayError>>,
    },
}

/// Messages sent to `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// A channel was opened; the room greets it with `welcome`.
    ChannelOpened {
        channel: ChannelHandle,
        respond_to: oneshot::Sender<Result<(), RelayError>>,
    },

    /// A decoded client event from one channel, in arrival order.
    ClientEvent {
        endpoint_id: EndpointId,
        event: ClientEvent,
    },

    /// The channel's socket closed (or was closed by the relay).
    ChannelClosed { endpoint_id: EndpointId },

    GetState {
        respond_to: oneshot::Sender<RoomState>,
    },

    /// Controller asks the room to stop if it still has no open channels.
    /// Replies `true` if the room is stopping.
    CloseIfIdle { respond_to: oneshot::Sender<bool> },
}

/// Snapshot of a room.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room_id: RoomId,
    /// Joined participants in registry order.
    pub participants: Vec<ParticipantInfo>,
    /// Open channels, joined or not.
    pub open_channels: usize,
    pub mailbox_depth: usize,
}

/// Controller status.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub room_count: usize,
    pub connection_count: usize,
    pub is_draining: bool,
    pub mailbox_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_room_message_debug() {
        let (channel, _rx) = ChannelHandle::channel(EndpointId::new(), 1, CancellationToken::new());
        let (tx, _rx) = oneshot::channel();
        let msg = RoomMessage::ChannelOpened {
            channel,
            respond_to: tx,
        };
        assert!(format!("{msg:?}").contains("ChannelOpened"));

        let msg = RoomMessage::ClientEvent {
            endpoint_id: EndpointId::new(),
            event: ClientEvent::Leave,
        };
        assert!(format!("{msg:?}").contains("Leave"));
    }

    #[test]
    fn test_room_state_clone() {
        let state = RoomState {
            room_id: RoomId::default(),
            participants: vec![],
            open_channels: 2,
            mailbox_depth: 0,
        };
        let cloned = state.clone();
        assert_eq!(cloned.room_id, state.room_id);
        assert_eq!(cloned.open_channels, 2);
    }
}
