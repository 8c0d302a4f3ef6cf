//! Network edge of the relay.
//!
//! - [`ws`] - WebSocket upgrade, per-channel reader and writer tasks

pub mod ws;

pub use ws::{cors_layer, relay_router, AppState};
