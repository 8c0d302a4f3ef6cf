//! Actor hierarchy of the relay.
//!
//! ```text
//! RoomControllerActor (singleton)
//! └── supervises N RoomActors
//!     └── RoomActor (one per active room)
//!         ├── owns the room's ParticipantRegistry
//!         └── holds one ChannelHandle per open WebSocket
//! ```
//!
//! - **Serialized rooms**: every event of every channel in a room is handled
//!   to completion by the room actor before the next one
//! - **CancellationToken propagation**: parents hand child tokens down, so
//!   cancelling the controller closes every room and socket
//! - **Mailbox monitoring**: depth thresholds with metrics (Controller: 100/500, Room: 200/800)
//!
//! # Modules
//!
//! - [`controller`] - `RoomControllerActor` that creates and retires rooms
//! - [`room`] - `RoomActor` per active room
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod controller;
pub mod messages;
pub mod metrics;
pub mod room;

pub use controller::{RoomControllerActor, RoomControllerActorHandle};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
pub use room::{RoomActor, RoomActorHandle};
