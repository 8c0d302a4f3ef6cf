//! `RoomActor` - per-room actor that owns the participant registry.
//!
//! Each `RoomActor`:
//! - Owns the `ParticipantRegistry` and the set of open channels for one room
//! - Processes every channel event to completion before the next, so the
//!   router, presence broadcaster and chat fan-out run without locks
//! - Evicts endpoints whose outbound queue rejects a write, and announces
//!   their departure (which may in turn reveal further dead channels)
//! - Tells the controller when its last channel has closed

use crate::errors::RelayError;
use crate::room::{chat, presence, router, ChannelHandle, Delivery, ParticipantRegistry};

use super::messages::{ControllerMessage, RoomMessage, RoomState};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::observability::metrics as prom;

use chrono::Utc;
use room_protocol::{ClientEvent, EndpointId, RoomId, ServerEvent, SignalKind, SignalingEnvelope};
use std::collections::{HashMap, VecDeque};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 1024;

/// Handle to a `RoomActor`.
#[derive(Debug, Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: RoomId,
}

impl RoomActorHandle {
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Register a newly opened channel. The room sends it `welcome`.
    pub async fn channel_opened(&self, channel: ChannelHandle) -> Result<(), RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::ChannelOpened {
                channel,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    /// Forward one decoded client event.
    pub async fn client_event(
        &self,
        endpoint_id: EndpointId,
        event: ClientEvent,
    ) -> Result<(), RelayError> {
        self.sender
            .send(RoomMessage::ClientEvent { endpoint_id, event })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))
    }

    /// Notify that a channel's socket has closed.
    pub async fn channel_closed(&self, endpoint_id: EndpointId) -> Result<(), RelayError> {
        self.sender
            .send(RoomMessage::ChannelClosed { endpoint_id })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))
    }

    pub async fn get_state(&self) -> Result<RoomState, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Ask the room to stop if it has no open channels.
    pub async fn close_if_idle(&self) -> Result<bool, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RoomMessage::CloseIfIdle { respond_to: tx })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    room_id: RoomId,
    receiver: mpsc::Receiver<RoomMessage>,
    /// Child of the controller's token.
    cancel_token: CancellationToken,
    registry: ParticipantRegistry,
    /// Every open channel, joined or not.
    channels: HashMap<EndpointId, ChannelHandle>,
    /// Used to report `RoomIdle`.
    controller: mpsc::Sender<ControllerMessage>,
    /// Set once `RoomIdle` has been sent for the current idle period.
    idle_reported: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// `capacity` limits joined participants; zero means unlimited.
    pub fn spawn(
        room_id: RoomId,
        capacity: usize,
        cancel_token: CancellationToken,
        controller: mpsc::Sender<ControllerMessage>,
        metrics: Arc<ActorMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            registry: ParticipantRegistry::with_capacity_limit(room_id.clone(), capacity),
            channels: HashMap::new(),
            controller,
            idle_reported: false,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Room, room_id.as_str()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "relay.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "relay.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            let flow = self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                            if flow.is_break() {
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "relay.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            participants = self.registry.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    fn handle_message(&mut self, message: RoomMessage) -> ControlFlow<()> {
        match message {
            RoomMessage::ChannelOpened {
                channel,
                respond_to,
            } => {
                let result = self.handle_channel_opened(channel);
                let _ = respond_to.send(result);
            }

            RoomMessage::ClientEvent { endpoint_id, event } => {
                let event_name = event.name();
                let started = Instant::now();
                self.handle_client_event(endpoint_id, event);
                prom::record_event_latency(event_name, started.elapsed());
            }

            RoomMessage::ChannelClosed { endpoint_id } => {
                self.handle_channel_closed(endpoint_id);
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.get_state());
            }

            RoomMessage::CloseIfIdle { respond_to } => {
                let idle = self.channels.is_empty();
                let _ = respond_to.send(idle);
                if idle {
                    debug!(
                        target: "relay.actor.room",
                        room_id = %self.room_id,
                        "Room idle, stopping"
                    );
                    return ControlFlow::Break(());
                }
                self.idle_reported = false;
            }
        }

        self.report_if_idle();
        ControlFlow::Continue(())
    }

    fn handle_channel_opened(&mut self, channel: ChannelHandle) -> Result<(), RelayError> {
        let endpoint_id = channel.endpoint_id();
        if self.channels.contains_key(&endpoint_id) {
            return Err(RelayError::DuplicateEndpoint(endpoint_id));
        }

        channel.send(ServerEvent::Welcome {
            endpoint_id,
            room_id: self.room_id.clone(),
        })?;

        self.channels.insert(endpoint_id, channel);
        self.idle_reported = false;
        self.metrics.connection_opened();

        debug!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            endpoint_id = %endpoint_id,
            open_channels = self.channels.len(),
            "Channel opened"
        );
        Ok(())
    }

    fn handle_client_event(&mut self, endpoint_id: EndpointId, event: ClientEvent) {
        if !self.channels.contains_key(&endpoint_id) {
            debug!(
                target: "relay.actor.room",
                room_id = %self.room_id,
                endpoint_id = %endpoint_id,
                event = event.name(),
                "Event from closed channel ignored"
            );
            return;
        }

        let result = match event {
            ClientEvent::Join {
                display_name,
                user_id,
            } => self.handle_join(endpoint_id, &display_name, user_id),
            ClientEvent::Leave => self.handle_leave(endpoint_id),
            ClientEvent::ChatMessage { content } => {
                chat::publish(&self.registry, endpoint_id, &content, Utc::now())
                    .map(|(_, delivery)| self.settle(delivery))
            }
            ClientEvent::Offer {
                target_endpoint_id,
                payload,
            } => self.handle_signal(endpoint_id, SignalKind::Offer, target_endpoint_id, payload),
            ClientEvent::Answer {
                target_endpoint_id,
                payload,
            } => self.handle_signal(endpoint_id, SignalKind::Answer, target_endpoint_id, payload),
            ClientEvent::Candidate {
                target_endpoint_id,
                payload,
            } => self.handle_signal(
                endpoint_id,
                SignalKind::Candidate,
                target_endpoint_id,
                payload,
            ),
        };

        if let Err(e) = result {
            if e.is_expected_race() {
                debug!(
                    target: "relay.actor.room",
                    room_id = %self.room_id,
                    endpoint_id = %endpoint_id,
                    reason = e.reason(),
                    "Event dropped"
                );
            } else {
                warn!(
                    target: "relay.actor.room",
                    room_id = %self.room_id,
                    endpoint_id = %endpoint_id,
                    error = %e,
                    "Event rejected"
                );
            }
        }
    }

    fn handle_join(
        &mut self,
        endpoint_id: EndpointId,
        display_name: &str,
        user_id: Option<String>,
    ) -> Result<(), RelayError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(RelayError::InvalidDisplayName);
        }
        let channel = self
            .channels
            .get(&endpoint_id)
            .cloned()
            .ok_or(RelayError::NotFound(endpoint_id))?;

        let joiner = self.registry.admit(
            endpoint_id,
            display_name.to_string(),
            user_id,
            Utc::now(),
            channel,
        )?;
        self.metrics.participant_joined();

        info!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            endpoint_id = %endpoint_id,
            participants = self.registry.len(),
            "Participant joined"
        );

        let delivery = presence::on_join(&self.registry, &joiner, Utc::now());
        self.settle(delivery);
        Ok(())
    }

    fn handle_leave(&mut self, endpoint_id: EndpointId) -> Result<(), RelayError> {
        let departed = self.registry.evict(endpoint_id)?;
        self.metrics.participant_left();

        info!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            endpoint_id = %endpoint_id,
            participants = self.registry.len(),
            "Participant left"
        );

        let delivery = presence::on_leave(&self.registry, &departed, Utc::now());
        self.settle(delivery);
        Ok(())
    }

    fn handle_signal(
        &mut self,
        from: EndpointId,
        kind: SignalKind,
        target: EndpointId,
        payload: serde_json::Value,
    ) -> Result<(), RelayError> {
        let envelope = SignalingEnvelope::new(kind, target, payload);
        match router::route(&self.registry, envelope, from) {
            Err(RelayError::ChannelWriteFailure { endpoint_id, .. }) => {
                prom::record_channel_write_failure();
                self.settle(Delivery {
                    delivered: 0,
                    failed: vec![endpoint_id],
                });
                Ok(())
            }
            other => other,
        }
    }

    fn handle_channel_closed(&mut self, endpoint_id: EndpointId) {
        if let Some(channel) = self.channels.remove(&endpoint_id) {
            channel.close();
            self.metrics.connection_closed();
        }

        match self.handle_leave(endpoint_id) {
            Ok(()) | Err(RelayError::NotFound(_)) => {}
            Err(e) => {
                warn!(
                    target: "relay.actor.room",
                    room_id = %self.room_id,
                    endpoint_id = %endpoint_id,
                    error = %e,
                    "Eviction on close failed"
                );
            }
        }

        debug!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            endpoint_id = %endpoint_id,
            open_channels = self.channels.len(),
            "Channel closed"
        );
    }

    /// Close and evict every endpoint a fan-out failed to reach. Departure
    /// announcements can fail too, so this runs until no failures remain.
    fn settle(&mut self, delivery: Delivery) {
        let mut pending: VecDeque<EndpointId> = delivery.failed.into();

        while let Some(endpoint_id) = pending.pop_front() {
            if let Some(channel) = self.channels.remove(&endpoint_id) {
                channel.close();
                self.metrics.connection_closed();
            }

            let Ok(departed) = self.registry.evict(endpoint_id) else {
                continue;
            };
            self.metrics.participant_left();

            info!(
                target: "relay.actor.room",
                room_id = %self.room_id,
                endpoint_id = %endpoint_id,
                participants = self.registry.len(),
                "Unreachable participant evicted"
            );

            let cascade = presence::on_leave(&self.registry, &departed, Utc::now());
            pending.extend(cascade.failed);
        }
    }

    fn report_if_idle(&mut self) {
        if !self.channels.is_empty() || self.idle_reported {
            return;
        }
        self.idle_reported = true;

        if let Err(e) = self.controller.try_send(ControllerMessage::RoomIdle {
            room_id: self.room_id.clone(),
        }) {
            warn!(
                target: "relay.actor.room",
                room_id = %self.room_id,
                error = %e,
                "Failed to report idle room"
            );
        }
    }

    fn get_state(&self) -> RoomState {
        RoomState {
            room_id: self.room_id.clone(),
            participants: self.registry.list(),
            open_channels: self.channels.len(),
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Close every channel. Participants are not announced as leaving, since
    /// every recipient is going away too.
    fn graceful_shutdown(&mut self) {
        info!(
            target: "relay.actor.room",
            room_id = %self.room_id,
            participants = self.registry.len(),
            channels = self.channels.len(),
            "Performing graceful shutdown"
        );

        for (_, channel) in self.channels.drain() {
            channel.close();
            self.metrics.connection_closed();
        }
        for _ in 0..self.registry.len() {
            self.metrics.participant_left();
        }
    }
}
