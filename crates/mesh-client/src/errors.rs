//! Client error types.

use room_protocol::{CodecError, EndpointId};
use thiserror::Error;

/// Client-side error type.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The media layer could not build or apply a session description or
    /// candidate for a remote.
    #[error("Media failure for {remote}: {reason}")]
    Media { remote: EndpointId, reason: String },

    /// Connecting to or talking to the relay failed.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The relay channel is gone; nothing more can be sent.
    #[error("Relay channel closed")]
    ChannelClosed,

    /// Actor mailbox or response channel failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeshError {
    /// Returns a bounded label for logging.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            MeshError::Media { .. } => "media",
            MeshError::Transport(_) => "transport",
            MeshError::Codec(_) => "codec",
            MeshError::ChannelClosed => "channel_closed",
            MeshError::Internal(_) => "internal",
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MeshError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MeshError::Transport(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_display() {
        let remote = EndpointId::new();
        let err = MeshError::Media {
            remote,
            reason: "no local tracks".to_string(),
        };
        assert_eq!(
            err.to_string(),
            format!("Media failure for {remote}: no local tracks")
        );
        assert_eq!(err.reason(), "media");
    }

    #[test]
    fn test_codec_error_converts() {
        let err: MeshError = CodecError::Empty.into();
        assert!(matches!(err, MeshError::Codec(CodecError::Empty)));
    }
}
