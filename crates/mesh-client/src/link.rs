//! `PeerLinkActor` - one actor per remote participant.
//!
//! State machine:
//!
//! ```text
//! Idle ──offer sent──▶ Negotiating ──media connected──▶ Connected
//!   │                      │                               │
//!   └──────────────────────┴──────────── close ────────────┴──▶ Closed
//! ```
//!
//! An offerer link starts in `Idle`, builds the offer and moves to
//! `Negotiating`. An answerer link starts in `Negotiating` with the remote's
//! offer and replies with an answer. Offer and answer generation are awaited
//! inside the link's own task, so links progress independently of each
//! other and of the mesh manager.

use crate::errors::MeshError;
use crate::media::MediaLayer;

use room_protocol::{ClientEvent, EndpointId};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Mailbox size per link.
const LINK_CHANNEL_BUFFER: usize = 64;

/// Lifecycle state of a peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Negotiating,
    Connected,
    Closed,
}

impl LinkState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LinkState::Idle => "idle",
            LinkState::Negotiating => "negotiating",
            LinkState::Connected => "connected",
            LinkState::Closed => "closed",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the negotiation this client plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Sends the offer. Existing participants offer to a newcomer.
    Offerer,
    /// Answers the remote's offer.
    Answerer,
}

impl LinkRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LinkRole::Offerer => "offerer",
            LinkRole::Answerer => "answerer",
        }
    }
}

/// Messages sent to a `PeerLinkActor`.
#[derive(Debug)]
enum LinkMessage {
    /// Remote's answer to our offer.
    RemoteAnswer(Value),
    /// Remote ICE candidate.
    RemoteCandidate(Value),
    /// Locally gathered ICE candidate, to be routed to the remote.
    LocalCandidate(Value),
    /// Media layer reports an established path.
    MediaConnected,
}

/// Handle to a `PeerLinkActor`.
#[derive(Debug, Clone)]
pub struct PeerLinkHandle {
    remote: EndpointId,
    role: LinkRole,
    sender: mpsc::Sender<LinkMessage>,
    state: watch::Receiver<LinkState>,
    cancel_token: CancellationToken,
}

impl PeerLinkHandle {
    #[must_use]
    pub fn remote(&self) -> EndpointId {
        self.remote
    }

    #[must_use]
    pub fn role(&self) -> LinkRole {
        self.role
    }

    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// A link is live until it reaches `Closed`.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state() != LinkState::Closed
    }

    /// Wait until the link reaches `target`.
    ///
    /// Fails if the link closes first (unless `target` is `Closed`).
    pub async fn wait_for_state(&self, target: LinkState) -> Result<(), MeshError> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| *s == target || *s == LinkState::Closed)
            .await
            .map(|s| *s);

        match reached {
            Ok(s) if s == target => Ok(()),
            // Sender dropped after the actor exited, which only happens once Closed
            Err(_) if target == LinkState::Closed => Ok(()),
            Ok(s) => Err(MeshError::Internal(format!(
                "link to {} reached {s} while waiting for {target}",
                self.remote
            ))),
            Err(e) => Err(MeshError::Internal(format!("state watch failed: {e}"))),
        }
    }

    pub async fn remote_answer(&self, payload: Value) {
        self.deliver(LinkMessage::RemoteAnswer(payload)).await;
    }

    pub async fn remote_candidate(&self, payload: Value) {
        self.deliver(LinkMessage::RemoteCandidate(payload)).await;
    }

    pub async fn local_candidate(&self, payload: Value) {
        self.deliver(LinkMessage::LocalCandidate(payload)).await;
    }

    pub async fn media_connected(&self) {
        self.deliver(LinkMessage::MediaConnected).await;
    }

    /// Close the link and release its media resources.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    /// Messages to a closed link are dropped.
    async fn deliver(&self, message: LinkMessage) {
        if self.sender.send(message).await.is_err() {
            debug!(
                target: "mesh.link",
                remote = %self.remote,
                "Link already closed, dropping message"
            );
        }
    }
}

/// The `PeerLinkActor` implementation.
pub struct PeerLinkActor {
    remote: EndpointId,
    role: LinkRole,
    /// Offer received from the remote (answerer only), consumed at start.
    remote_offer: Option<Value>,
    receiver: mpsc::Receiver<LinkMessage>,
    state: watch::Sender<LinkState>,
    media: Arc<dyn MediaLayer>,
    /// Client events for the relay.
    outbound: mpsc::Sender<ClientEvent>,
    cancel_token: CancellationToken,
}

impl PeerLinkActor {
    /// Spawn a link that offers to `remote`.
    pub fn spawn_offerer(
        remote: EndpointId,
        media: Arc<dyn MediaLayer>,
        outbound: mpsc::Sender<ClientEvent>,
        cancel_token: CancellationToken,
    ) -> (PeerLinkHandle, JoinHandle<()>) {
        Self::spawn(
            remote,
            LinkRole::Offerer,
            None,
            media,
            outbound,
            cancel_token,
        )
    }

    /// Spawn a link that answers `offer` from `remote`.
    pub fn spawn_answerer(
        remote: EndpointId,
        offer: Value,
        media: Arc<dyn MediaLayer>,
        outbound: mpsc::Sender<ClientEvent>,
        cancel_token: CancellationToken,
    ) -> (PeerLinkHandle, JoinHandle<()>) {
        Self::spawn(
            remote,
            LinkRole::Answerer,
            Some(offer),
            media,
            outbound,
            cancel_token,
        )
    }

    fn spawn(
        remote: EndpointId,
        role: LinkRole,
        remote_offer: Option<Value>,
        media: Arc<dyn MediaLayer>,
        outbound: mpsc::Sender<ClientEvent>,
        cancel_token: CancellationToken,
    ) -> (PeerLinkHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(LINK_CHANNEL_BUFFER);
        let initial = match role {
            LinkRole::Offerer => LinkState::Idle,
            LinkRole::Answerer => LinkState::Negotiating,
        };
        let (state_tx, state_rx) = watch::channel(initial);

        let actor = Self {
            remote,
            role,
            remote_offer,
            receiver,
            state: state_tx,
            media,
            outbound,
            cancel_token: cancel_token.clone(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = PeerLinkHandle {
            remote,
            role,
            sender,
            state: state_rx,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "mesh.link",
        fields(remote = %self.remote, role = self.role.as_str())
    )]
    async fn run(mut self) {
        debug!(target: "mesh.link", "PeerLinkActor started");

        let cancel_token = self.cancel_token.clone();
        let started = tokio::select! {
            () = cancel_token.cancelled() => Ok(()),
            result = self.start() => result,
        };

        if let Err(e) = started {
            warn!(
                target: "mesh.link",
                error = %e,
                "Negotiation could not start, closing link"
            );
            self.cancel_token.cancel();
        }

        while !cancel_token.is_cancelled() {
            tokio::select! {
                () = cancel_token.cancelled() => break,

                msg = self.receiver.recv() => {
                    let Some(message) = msg else { break };
                    // In-flight media work is abandoned on close
                    let handled = tokio::select! {
                        () = cancel_token.cancelled() => break,
                        result = self.handle_message(message) => result,
                    };
                    if let Err(e) = handled {
                        warn!(
                            target: "mesh.link",
                            error = %e,
                            "Link failed, closing"
                        );
                        break;
                    }
                }
            }
        }

        self.media.close(self.remote).await;
        self.set_state(LinkState::Closed);
        info!(target: "mesh.link", "PeerLinkActor closed");
    }

    /// Send the offer or answer that opens negotiation.
    async fn start(&mut self) -> Result<(), MeshError> {
        match self.role {
            LinkRole::Offerer => {
                let offer = self.media.create_offer(self.remote).await?;
                self.set_state(LinkState::Negotiating);
                self.send(ClientEvent::Offer {
                    target_endpoint_id: self.remote,
                    payload: offer,
                })
                .await
            }
            LinkRole::Answerer => {
                let offer = self.remote_offer.take().unwrap_or(Value::Null);
                let answer = self.media.accept_offer(self.remote, offer).await?;
                self.send(ClientEvent::Answer {
                    target_endpoint_id: self.remote,
                    payload: answer,
                })
                .await
            }
        }
    }

    async fn handle_message(&mut self, message: LinkMessage) -> Result<(), MeshError> {
        match message {
            LinkMessage::RemoteAnswer(payload) => {
                if self.role != LinkRole::Offerer || self.current() != LinkState::Negotiating {
                    debug!(
                        target: "mesh.link",
                        state = %self.current(),
                        "Ignoring unexpected answer"
                    );
                    return Ok(());
                }
                self.media.apply_answer(self.remote, payload).await
            }

            LinkMessage::RemoteCandidate(payload) => {
                self.media.add_candidate(self.remote, payload).await
            }

            LinkMessage::LocalCandidate(payload) => {
                self.send(ClientEvent::Candidate {
                    target_endpoint_id: self.remote,
                    payload,
                })
                .await
            }

            LinkMessage::MediaConnected => {
                if self.current() == LinkState::Negotiating {
                    self.set_state(LinkState::Connected);
                    info!(target: "mesh.link", "Peer link connected");
                }
                Ok(())
            }
        }
    }

    async fn send(&self, event: ClientEvent) -> Result<(), MeshError> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| MeshError::ChannelClosed)
    }

    fn current(&self) -> LinkState {
        *self.state.borrow()
    }

    fn set_state(&self, next: LinkState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(
                target: "mesh.link",
                from = %previous,
                to = %next,
                "Link state changed"
            );
        }
    }
}
