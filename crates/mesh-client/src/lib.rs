//! Room relay client.
//!
//! Joins a room through the relay, keeps a roster and chat feed, and builds a
//! full mesh of peer links to every other participant:
//!
//! ```text
//! MeshClientActor
//! ├── RelayConnection (WebSocket reader + writer tasks)
//! ├── ChatFeed (roster, chat lines with optimistic echo)
//! └── MeshManager
//!     └── PeerLinkActor (one per remote participant)
//! ```
//!
//! Media is behind the [`MediaLayer`] trait; the client only moves opaque
//! offer/answer/candidate payloads. With the `test-utils` feature,
//! [`media::mock::MockMediaLayer`] provides a scripted implementation.

pub mod chat;
pub mod client;
pub mod errors;
pub mod link;
pub mod media;
pub mod mesh;
pub mod transport;

pub use chat::{ChatFeed, ChatLine, RosterEntry};
pub use client::{ClientSnapshot, MeshClientActor, MeshClientHandle};
pub use errors::MeshError;
pub use link::{LinkRole, LinkState, PeerLinkActor, PeerLinkHandle};
pub use media::{MediaEvent, MediaLayer};
pub use mesh::{LinkSummary, MeshManager};
pub use transport::{connect, RelayConnection};
