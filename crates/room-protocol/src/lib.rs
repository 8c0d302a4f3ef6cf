//! Wire protocol for the room relay.
//!
//! Every relay channel carries JSON text frames, one event per frame,
//! discriminated by a `type` field. Events are decoded exactly once at the
//! channel boundary into the [`ClientEvent`] / [`ServerEvent`] sum types and
//! dispatched by pattern match from there on.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod events;
pub mod ids;

pub use codec::{
    decode_client_event, decode_server_event, encode_client_event, encode_server_event,
    CodecError,
};
pub use events::{ChatKind, ChatMessage, ClientEvent, ServerEvent, SignalKind, SignalingEnvelope};
pub use ids::{EndpointId, RoomId};
