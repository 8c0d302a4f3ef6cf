//! Mesh manager - owns one [`PeerLinkHandle`] per remote participant.
//!
//! Offer direction is fixed: participants already in the room offer to a
//! newcomer (a live `user-joined`), and the newcomer answers each offer as
//! it arrives. Roster replays (`existing: true`) never create links.

use crate::link::{LinkRole, LinkState, PeerLinkActor, PeerLinkHandle};
use crate::media::{MediaEvent, MediaLayer};

use room_protocol::{ClientEvent, EndpointId, ServerEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Summary of one link, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSummary {
    pub remote: EndpointId,
    pub role: LinkRole,
    pub state: LinkState,
}

struct ManagedLink {
    handle: PeerLinkHandle,
    task_handle: JoinHandle<()>,
}

/// Client-side manager of the full mesh.
pub struct MeshManager {
    /// Learned from `welcome`.
    local_endpoint_id: Option<EndpointId>,
    media: Arc<dyn MediaLayer>,
    outbound: mpsc::Sender<ClientEvent>,
    links: HashMap<EndpointId, ManagedLink>,
    /// Tasks of closed links still releasing their media.
    retiring: HashMap<EndpointId, JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl MeshManager {
    /// `outbound` carries signaling to the relay. Every link runs under a
    /// child of `cancel_token`.
    pub fn new(
        media: Arc<dyn MediaLayer>,
        outbound: mpsc::Sender<ClientEvent>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            local_endpoint_id: None,
            media,
            outbound,
            links: HashMap::new(),
            retiring: HashMap::new(),
            cancel_token,
        }
    }

    #[must_use]
    pub fn local_endpoint_id(&self) -> Option<EndpointId> {
        self.local_endpoint_id
    }

    /// Handle of the live link to `remote`, if any.
    #[must_use]
    pub fn link(&self, remote: EndpointId) -> Option<PeerLinkHandle> {
        self.links
            .get(&remote)
            .filter(|managed| managed.handle.is_live())
            .map(|managed| managed.handle.clone())
    }

    /// Live links, in no particular order.
    #[must_use]
    pub fn links(&self) -> Vec<LinkSummary> {
        self.links
            .values()
            .filter(|managed| managed.handle.is_live())
            .map(|managed| LinkSummary {
                remote: managed.handle.remote(),
                role: managed.handle.role(),
                state: managed.handle.state(),
            })
            .collect()
    }

    /// React to one relay event.
    pub async fn handle_server_event(&mut self, event: &ServerEvent) {
        self.prune_closed();

        match event {
            ServerEvent::Welcome { endpoint_id, .. } => {
                self.local_endpoint_id = Some(*endpoint_id);
            }

            ServerEvent::UserJoined {
                endpoint_id,
                existing,
                ..
            } => {
                if *existing {
                    // Roster replay; the remote will offer to us
                    return;
                }
                self.on_live_join(*endpoint_id).await;
            }

            ServerEvent::UserLeft { endpoint_id, .. } => {
                self.close_link(*endpoint_id, "remote left");
            }

            ServerEvent::Offer {
                from_endpoint_id,
                payload,
            } => {
                self.on_offer(*from_endpoint_id, payload.clone()).await;
            }

            ServerEvent::Answer {
                from_endpoint_id,
                payload,
            } => match self.link(*from_endpoint_id) {
                Some(link) => link.remote_answer(payload.clone()).await,
                None => debug!(
                    target: "mesh.manager",
                    remote = %from_endpoint_id,
                    "Answer for unknown link ignored"
                ),
            },

            ServerEvent::Candidate {
                from_endpoint_id,
                payload,
            } => match self.link(*from_endpoint_id) {
                Some(link) => link.remote_candidate(payload.clone()).await,
                None => debug!(
                    target: "mesh.manager",
                    remote = %from_endpoint_id,
                    "Candidate for unknown link ignored"
                ),
            },

            ServerEvent::ChatMessage(_) => {}
        }
    }

    /// React to one media layer event.
    pub async fn handle_media_event(&mut self, event: MediaEvent) {
        self.prune_closed();

        match event {
            MediaEvent::LocalCandidate { remote, payload } => {
                if let Some(link) = self.link(remote) {
                    link.local_candidate(payload).await;
                }
            }
            MediaEvent::Connected { remote } => {
                if let Some(link) = self.link(remote) {
                    link.media_connected().await;
                }
            }
            MediaEvent::Failed { remote, reason } => {
                warn!(
                    target: "mesh.manager",
                    remote = %remote,
                    reason = %reason,
                    "Media connection failed"
                );
                self.close_link(remote, "media failed");
            }
        }
    }

    /// Close every link, e.g. when the relay channel closes or on `leave`.
    pub async fn close_all(&mut self) {
        let count = self.links.len();
        for (remote, managed) in self.links.drain() {
            managed.handle.close();
            Self::join_link_task(remote, managed.task_handle).await;
        }
        for (remote, task_handle) in self.retiring.drain() {
            Self::join_link_task(remote, task_handle).await;
        }
        if count > 0 {
            info!(target: "mesh.manager", links = count, "All links closed");
        }
    }

    async fn on_live_join(&mut self, remote: EndpointId) {
        if Some(remote) == self.local_endpoint_id {
            return;
        }
        if self.link(remote).is_some() {
            debug!(
                target: "mesh.manager",
                remote = %remote,
                "Join for remote with a live link ignored"
            );
            return;
        }
        self.finish_retiring(remote).await;

        let (handle, task_handle) = PeerLinkActor::spawn_offerer(
            remote,
            Arc::clone(&self.media),
            self.outbound.clone(),
            self.cancel_token.child_token(),
        );
        self.links.insert(
            remote,
            ManagedLink {
                handle,
                task_handle,
            },
        );
        info!(
            target: "mesh.manager",
            remote = %remote,
            role = LinkRole::Offerer.as_str(),
            "Peer link created"
        );
    }

    async fn on_offer(&mut self, remote: EndpointId, offer: Value) {
        if self.link(remote).is_some() {
            debug!(
                target: "mesh.manager",
                remote = %remote,
                "Offer for remote with a live link ignored"
            );
            return;
        }
        self.finish_retiring(remote).await;

        let (handle, task_handle) = PeerLinkActor::spawn_answerer(
            remote,
            offer,
            Arc::clone(&self.media),
            self.outbound.clone(),
            self.cancel_token.child_token(),
        );
        self.links.insert(
            remote,
            ManagedLink {
                handle,
                task_handle,
            },
        );
        info!(
            target: "mesh.manager",
            remote = %remote,
            role = LinkRole::Answerer.as_str(),
            "Peer link created"
        );
    }

    fn close_link(&mut self, remote: EndpointId, reason: &'static str) {
        if let Some(managed) = self.links.remove(&remote) {
            managed.handle.close();
            self.retiring.insert(remote, managed.task_handle);
            info!(
                target: "mesh.manager",
                remote = %remote,
                reason,
                "Peer link closed"
            );
        }
    }

    /// A closed link releases its media for `remote` when its task ends, so
    /// a new link to the same remote must not start before that.
    async fn finish_retiring(&mut self, remote: EndpointId) {
        if let Some(task_handle) = self.retiring.remove(&remote) {
            debug!(
                target: "mesh.manager",
                remote = %remote,
                "Waiting for previous link to release media"
            );
            Self::join_link_task(remote, task_handle).await;
        }
    }

    async fn join_link_task(remote: EndpointId, task_handle: JoinHandle<()>) {
        if let Err(e) = task_handle.await {
            warn!(
                target: "mesh.manager",
                remote = %remote,
                error = ?e,
                "Link task failed"
            );
        }
    }

    /// Forget links whose actor already closed on its own.
    fn prune_closed(&mut self) {
        self.links.retain(|_, managed| managed.handle.is_live());
        self.retiring.retain(|_, task_handle| !task_handle.is_finished());
    }
}
