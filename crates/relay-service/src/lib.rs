//! Room Relay Service Library
//!
//! Core of the room relay, a WebSocket server that lets browser clients:
//!
//! - See who else is in a room (presence)
//! - Exchange chat lines, fanned out to everyone in the room
//! - Exchange offer/answer/candidate envelopes so they can build a
//!   full-mesh of peer connections among themselves
//!
//! The relay never touches media. It only routes opaque signaling payloads
//! from one endpoint to another.
//!
//! # Architecture
//!
//! ```text
//! RoomControllerActor (singleton)
//! └── RoomActor (one per active room)
//!     ├── ParticipantRegistry
//!     ├── presence / chat / signaling router
//!     └── ChannelHandle per open WebSocket
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Room and controller actors
//! - [`room`] - Registry, router, presence broadcaster and chat fan-out
//! - [`transport`] - WebSocket routes and per-channel tasks
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types
//! - [`observability`] - Health endpoints and Prometheus metrics

pub mod actors;
pub mod config;
pub mod errors;
pub mod observability;
pub mod room;
pub mod transport;
