//! `MeshClientActor` - ties a relay connection to the chat feed and the mesh.
//!
//! Every relay event is applied to the [`ChatFeed`] and then to the
//! [`MeshManager`], in arrival order. Media layer events feed the mesh.
//! When the relay channel closes, every peer link is closed.

use crate::chat::{ChatFeed, ChatLine, RosterEntry};
use crate::errors::MeshError;
use crate::media::{MediaEvent, MediaLayer};
use crate::mesh::{LinkSummary, MeshManager};
use crate::transport::{self, RelayConnection};

use room_protocol::{ClientEvent, EndpointId, ServerEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

const CLIENT_CHANNEL_BUFFER: usize = 64;

/// Point-in-time view of a client.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub endpoint_id: Option<EndpointId>,
    /// Relay channel still open.
    pub connected: bool,
    pub joined: bool,
    pub roster: Vec<RosterEntry>,
    pub chat: Vec<ChatLine>,
    pub links: Vec<LinkSummary>,
}

#[derive(Debug)]
enum ClientCommand {
    Join,
    Leave,
    SendChat {
        content: String,
        /// `false` if the line was blank and nothing was sent.
        respond_to: oneshot::Sender<bool>,
    },
    Snapshot {
        respond_to: oneshot::Sender<ClientSnapshot>,
    },
}

/// Handle to a `MeshClientActor`.
#[derive(Clone)]
pub struct MeshClientHandle {
    sender: mpsc::Sender<ClientCommand>,
    cancel_token: CancellationToken,
}

impl MeshClientHandle {
    /// Connect to the relay and start the client. Call [`join`](Self::join)
    /// to enter the room.
    pub async fn connect(
        url: &str,
        display_name: impl Into<String>,
        media: Arc<dyn MediaLayer>,
        media_events: mpsc::UnboundedReceiver<MediaEvent>,
    ) -> Result<Self, MeshError> {
        let cancel_token = CancellationToken::new();
        let connection = transport::connect(url, cancel_token.child_token()).await?;
        let (handle, _task) =
            MeshClientActor::spawn(connection, display_name, media, media_events, cancel_token);
        Ok(handle)
    }

    pub async fn join(&self) -> Result<(), MeshError> {
        self.command(ClientCommand::Join).await
    }

    /// Leave the room but keep the relay channel open.
    pub async fn leave(&self) -> Result<(), MeshError> {
        self.command(ClientCommand::Leave).await
    }

    /// Send a chat line. Returns `false` if it was blank.
    pub async fn send_chat(&self, content: impl Into<String>) -> Result<bool, MeshError> {
        let (tx, rx) = oneshot::channel();
        self.command(ClientCommand::SendChat {
            content: content.into(),
            respond_to: tx,
        })
        .await?;
        rx.await
            .map_err(|e| MeshError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn snapshot(&self) -> Result<ClientSnapshot, MeshError> {
        let (tx, rx) = oneshot::channel();
        self.command(ClientCommand::Snapshot { respond_to: tx })
            .await?;
        rx.await
            .map_err(|e| MeshError::Internal(format!("response receive failed: {e}")))
    }

    /// Close the relay channel and every peer link.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn command(&self, command: ClientCommand) -> Result<(), MeshError> {
        self.sender
            .send(command)
            .await
            .map_err(|e| MeshError::Internal(format!("channel send failed: {e}")))
    }
}

/// The `MeshClientActor` implementation.
pub struct MeshClientActor {
    display_name: String,
    receiver: mpsc::Receiver<ClientCommand>,
    inbound: mpsc::Receiver<ServerEvent>,
    outbound: mpsc::Sender<ClientEvent>,
    media_events: mpsc::UnboundedReceiver<MediaEvent>,
    connection_token: CancellationToken,
    cancel_token: CancellationToken,
    feed: ChatFeed,
    mesh: MeshManager,
    connected: bool,
    joined: bool,
}

impl MeshClientActor {
    /// Spawn the client over an open connection.
    pub fn spawn(
        connection: RelayConnection,
        display_name: impl Into<String>,
        media: Arc<dyn MediaLayer>,
        media_events: mpsc::UnboundedReceiver<MediaEvent>,
        cancel_token: CancellationToken,
    ) -> (MeshClientHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CLIENT_CHANNEL_BUFFER);
        let display_name = display_name.into();

        let mesh = MeshManager::new(
            media,
            connection.outbound.clone(),
            cancel_token.child_token(),
        );

        let actor = Self {
            feed: ChatFeed::new(display_name.clone()),
            display_name,
            receiver,
            inbound: connection.inbound,
            outbound: connection.outbound,
            media_events,
            connection_token: connection.cancel_token,
            cancel_token: cancel_token.clone(),
            mesh,
            connected: true,
            joined: false,
        };

        let task_handle = tokio::spawn(actor.run());

        (
            MeshClientHandle {
                sender,
                cancel_token,
            },
            task_handle,
        )
    }

    #[instrument(skip_all, name = "mesh.client", fields(display_name = %self.display_name))]
    async fn run(mut self) {
        debug!(target: "mesh.client", "MeshClientActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,

                command = self.receiver.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }

                event = self.inbound.recv(), if self.connected => {
                    match event {
                        Some(event) => self.handle_server_event(&event).await,
                        None => self.on_disconnected().await,
                    }
                }

                Some(event) = self.media_events.recv() => {
                    self.mesh.handle_media_event(event).await;
                }
            }
        }

        self.mesh.close_all().await;
        self.connection_token.cancel();
        info!(target: "mesh.client", "MeshClientActor stopped");
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Join => {
                self.send(ClientEvent::Join {
                    display_name: self.display_name.clone(),
                    user_id: None,
                })
                .await;
                self.joined = true;
            }

            ClientCommand::Leave => {
                self.send(ClientEvent::Leave).await;
                self.joined = false;
                self.mesh.close_all().await;
                self.feed.clear_roster();
            }

            ClientCommand::SendChat {
                content,
                respond_to,
            } => {
                let sent = match self.feed.compose(&content) {
                    Some(event) => {
                        self.send(event).await;
                        true
                    }
                    None => false,
                };
                let _ = respond_to.send(sent);
            }

            ClientCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(ClientSnapshot {
                    endpoint_id: self.mesh.local_endpoint_id(),
                    connected: self.connected,
                    joined: self.joined,
                    roster: self.feed.roster().to_vec(),
                    chat: self.feed.lines().to_vec(),
                    links: self.mesh.links(),
                });
            }
        }
    }

    async fn handle_server_event(&mut self, event: &ServerEvent) {
        debug!(target: "mesh.client", event = event.name(), "Relay event");
        // Events still in flight from a room we left
        if !self.joined && !matches!(event, ServerEvent::Welcome { .. }) {
            debug!(
                target: "mesh.client",
                event = event.name(),
                "Not joined, relay event ignored"
            );
            return;
        }
        self.feed.apply(event);
        self.mesh.handle_server_event(event).await;
    }

    async fn on_disconnected(&mut self) {
        info!(target: "mesh.client", "Relay channel closed, closing all links");
        self.connected = false;
        self.joined = false;
        self.mesh.close_all().await;
        self.feed.clear_roster();
    }

    async fn send(&self, event: ClientEvent) {
        if self.outbound.send(event).await.is_err() {
            debug!(target: "mesh.client", "Relay channel closed, event dropped");
        }
    }
}
