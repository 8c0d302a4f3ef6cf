//! JSON text-frame codec for relay events.

use crate::events::{ClientEvent, ServerEvent};

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame carried no data
    #[error("Empty frame")]
    Empty,

    /// Frame was not a valid event
    #[error("Invalid frame format: {0}")]
    InvalidFormat(#[from] serde_json::Error),
}

/// Decode one client frame.
///
/// # Errors
///
/// Returns an error if the frame is blank or is not a known client event.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, CodecError> {
    if text.trim().is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_str(text)?)
}

/// Encode one client frame.
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn encode_client_event(event: &ClientEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

/// Decode one server frame.
///
/// # Errors
///
/// Returns an error if the frame is blank or is not a known server event.
pub fn decode_server_event(text: &str) -> Result<ServerEvent, CodecError> {
    if text.trim().is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_str(text)?)
}

/// Encode one server frame.
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn encode_server_event(event: &ServerEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}
