//! # Relay Test Utilities
//!
//! Shared fixtures for room relay and mesh client tests.
//!
//! - `fixtures` - test participants with an in-memory outbound queue
//! - `recorder` - drain and describe the events a channel received
//! - `ws_client` - a WebSocket client speaking the relay protocol, for
//!   end-to-end tests against an in-process server
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_test_utils::*;
//!
//! let alice = TestParticipant::new("alice").open(16);
//! // hand alice.sender / alice.cancel_token to the code under test ...
//! assert_eq!(alice.recorder.drain_described(), vec!["system:alice joined the chat"]);
//! ```

pub mod fixtures;
pub mod recorder;
pub mod ws_client;

pub use fixtures::*;
pub use recorder::*;
pub use ws_client::*;
