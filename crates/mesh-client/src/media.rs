//! Boundary to the peer-connection media stack.
//!
//! The mesh never inspects session descriptions or candidates; it moves
//! opaque JSON payloads between the relay and a [`MediaLayer`]. The media
//! layer reports asynchronous happenings (a local candidate was gathered, a
//! path was established, a connection failed for good) as [`MediaEvent`]s on
//! a channel the client owns.

use crate::errors::MeshError;

use async_trait::async_trait;
use room_protocol::EndpointId;
use serde_json::Value;

/// Something the media layer observed about one remote.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// A local ICE candidate for the connection to `remote`.
    LocalCandidate { remote: EndpointId, payload: Value },
    /// A media path to `remote` is established.
    Connected { remote: EndpointId },
    /// The connection to `remote` failed and will not recover.
    Failed { remote: EndpointId, reason: String },
}

impl MediaEvent {
    #[must_use]
    pub const fn remote(&self) -> EndpointId {
        match self {
            MediaEvent::LocalCandidate { remote, .. }
            | MediaEvent::Connected { remote }
            | MediaEvent::Failed { remote, .. } => *remote,
        }
    }
}

/// One peer connection per remote, driven by the mesh.
#[async_trait]
pub trait MediaLayer: Send + Sync {
    /// Create the connection to `remote`, attach local tracks and produce an offer.
    async fn create_offer(&self, remote: EndpointId) -> Result<Value, MeshError>;

    /// Create the connection to `remote` from its offer and produce an answer.
    async fn accept_offer(&self, remote: EndpointId, offer: Value) -> Result<Value, MeshError>;

    async fn apply_answer(&self, remote: EndpointId, answer: Value) -> Result<(), MeshError>;

    async fn add_candidate(&self, remote: EndpointId, candidate: Value) -> Result<(), MeshError>;

    /// Release everything held for `remote`. Idempotent.
    async fn close(&self, remote: EndpointId);
}

/// Scripted media layer for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;

    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// A call the mesh made on the media layer.
    #[derive(Debug, Clone, PartialEq)]
    pub enum MediaCall {
        CreateOffer(EndpointId),
        AcceptOffer(EndpointId, Value),
        ApplyAnswer(EndpointId, Value),
        AddCandidate(EndpointId, Value),
        Close(EndpointId),
    }

    /// Media layer that answers instantly.
    ///
    /// - `create_offer` reports one local candidate for the remote
    /// - `accept_offer` reports one local candidate, then `Connected`
    /// - `apply_answer` reports `Connected`, after the delay set with
    ///   [`MockMediaLayer::delay_answers`]
    ///
    /// Remotes marked with [`MockMediaLayer::fail_remote`] get errors instead.
    pub struct MockMediaLayer {
        local_label: String,
        events: mpsc::UnboundedSender<MediaEvent>,
        calls: Mutex<Vec<MediaCall>>,
        failing: Mutex<HashSet<EndpointId>>,
        answer_delay: Mutex<Option<Duration>>,
    }

    impl MockMediaLayer {
        /// Create a mock and the receiver of its media events. `local_label`
        /// is embedded in generated payloads.
        pub fn new(
            local_label: impl Into<String>,
        ) -> (Arc<Self>, mpsc::UnboundedReceiver<MediaEvent>) {
            let (events, rx) = mpsc::unbounded_channel();
            let layer = Arc::new(Self {
                local_label: local_label.into(),
                events,
                calls: Mutex::new(Vec::new()),
                failing: Mutex::new(HashSet::new()),
                answer_delay: Mutex::new(None),
            });
            (layer, rx)
        }

        /// Make every later operation for `remote` fail.
        pub fn fail_remote(&self, remote: EndpointId) {
            self.failing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(remote);
        }

        /// Make `apply_answer` take `delay` before it completes.
        pub fn delay_answers(&self, delay: Duration) {
            *self
                .answer_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(delay);
        }

        /// Report a permanent failure for `remote`, as a real stack would.
        pub fn report_failure(&self, remote: EndpointId, reason: impl Into<String>) {
            let _ = self.events.send(MediaEvent::Failed {
                remote,
                reason: reason.into(),
            });
        }

        /// Every call so far, in order.
        #[must_use]
        pub fn calls(&self) -> Vec<MediaCall> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Calls that concern `remote`.
        #[must_use]
        pub fn calls_for(&self, remote: EndpointId) -> Vec<MediaCall> {
            self.calls()
                .into_iter()
                .filter(|call| call_remote(call) == remote)
                .collect()
        }

        fn record(&self, call: MediaCall) {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
        }

        fn check(&self, remote: EndpointId) -> Result<(), MeshError> {
            let failing = self
                .failing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&remote);
            if failing {
                return Err(MeshError::Media {
                    remote,
                    reason: "scripted failure".to_string(),
                });
            }
            Ok(())
        }

        fn local_candidate(&self, remote: EndpointId) {
            let _ = self.events.send(MediaEvent::LocalCandidate {
                remote,
                payload: json!({
                    "candidate": format!("candidate:{} 1 udp 2122260223 10.0.0.1 50000 typ host", self.local_label),
                    "sdpMid": "0",
                    "sdpMLineIndex": 0,
                }),
            });
        }
    }

    fn call_remote(call: &MediaCall) -> EndpointId {
        match call {
            MediaCall::CreateOffer(remote)
            | MediaCall::AcceptOffer(remote, _)
            | MediaCall::ApplyAnswer(remote, _)
            | MediaCall::AddCandidate(remote, _)
            | MediaCall::Close(remote) => *remote,
        }
    }

    #[async_trait]
    impl MediaLayer for MockMediaLayer {
        async fn create_offer(&self, remote: EndpointId) -> Result<Value, MeshError> {
            self.record(MediaCall::CreateOffer(remote));
            self.check(remote)?;
            self.local_candidate(remote);
            Ok(json!({"type": "offer", "sdp": format!("v=0 offer from {}", self.local_label)}))
        }

        async fn accept_offer(&self, remote: EndpointId, offer: Value) -> Result<Value, MeshError> {
            self.record(MediaCall::AcceptOffer(remote, offer));
            self.check(remote)?;
            self.local_candidate(remote);
            let _ = self.events.send(MediaEvent::Connected { remote });
            Ok(json!({"type": "answer", "sdp": format!("v=0 answer from {}", self.local_label)}))
        }

        async fn apply_answer(&self, remote: EndpointId, answer: Value) -> Result<(), MeshError> {
            self.record(MediaCall::ApplyAnswer(remote, answer));
            let delay = *self
                .answer_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.check(remote)?;
            let _ = self.events.send(MediaEvent::Connected { remote });
            Ok(())
        }

        async fn add_candidate(
            &self,
            remote: EndpointId,
            candidate: Value,
        ) -> Result<(), MeshError> {
            self.record(MediaCall::AddCandidate(remote, candidate));
            self.check(remote)
        }

        async fn close(&self, remote: EndpointId) {
            self.record(MediaCall::Close(remote));
        }
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_offer_reports_candidate() {
            let (media, mut events) = MockMediaLayer::new("alice");
            let remote = EndpointId::new();

            let offer = media.create_offer(remote).await.unwrap();
            assert_eq!(offer.get("type").and_then(Value::as_str), Some("offer"));

            let event = events.recv().await.unwrap();
            assert!(matches!(event, MediaEvent::LocalCandidate { .. }));
            assert_eq!(event.remote(), remote);
        }

        #[tokio::test]
        async fn test_mock_accept_reports_connected() {
            let (media, mut events) = MockMediaLayer::new("bob");
            let remote = EndpointId::new();

            media.accept_offer(remote, json!({"sdp": "x"})).await.unwrap();
            assert!(matches!(
                events.recv().await.unwrap(),
                MediaEvent::LocalCandidate { .. }
            ));
            assert_eq!(
                events.recv().await.unwrap(),
                MediaEvent::Connected { remote }
            );
        }

        #[tokio::test]
        async fn test_mock_failing_remote() {
            let (media, _events) = MockMediaLayer::new("carol");
            let remote = EndpointId::new();
            media.fail_remote(remote);

            assert!(media.create_offer(remote).await.is_err());
            assert_eq!(media.calls_for(remote), vec![MediaCall::CreateOffer(remote)]);
        }
    }
}
