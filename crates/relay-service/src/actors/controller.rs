//! `RoomControllerActor` - singleton supervisor for room actors.
//!
//! - Owns the `RoomId -> RoomActor` map
//! - Creates a room on the first channel opened for it and removes it once
//!   its last channel has closed
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//!
//! Opening a channel and retiring an idle room are both handled inside the
//! controller's loop, one at a time. A room therefore cannot be retired
//! between being handed to a new channel and registering that channel.

use crate::errors::RelayError;
use crate::room::ChannelHandle;

use super::messages::{ControllerMessage, ControllerStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::room::{RoomActor, RoomActorHandle};

use room_protocol::RoomId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// Time rooms get to finish when the controller is cancelled without an
/// explicit `shutdown`.
const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// Handle to the `RoomControllerActor`.
///
/// This is the public interface for interacting with the controller.
#[derive(Clone)]
pub struct RoomControllerActorHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
}

impl RoomControllerActorHandle {
    /// Spawn the controller and return a handle to it.
    ///
    /// `room_capacity` limits joined participants per room; zero means unlimited.
    #[must_use]
    pub fn new(room_capacity: usize, metrics: Arc<ActorMetrics>) -> Self {
        Self::with_cancel_token(room_capacity, metrics, CancellationToken::new())
    }

    /// Spawn the controller under an existing root token.
    #[must_use]
    pub fn with_cancel_token(
        room_capacity: usize,
        metrics: Arc<ActorMetrics>,
        cancel_token: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let actor = RoomControllerActor::new(
            receiver,
            sender.clone(),
            cancel_token.clone(),
            room_capacity,
            metrics,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Attach a channel to `room_id`, creating the room if it does not exist.
    ///
    /// On success the room has already queued `welcome` on the channel.
    pub async fn open_channel(
        &self,
        room_id: RoomId,
        channel: ChannelHandle,
    ) -> Result<RoomActorHandle, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::OpenChannel {
                room_id,
                channel,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn get_status(&self) -> Result<ControllerStatus, RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), RelayError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(ControllerMessage::Shutdown {
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|e| RelayError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RelayError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that must stop with the relay.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

struct ManagedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
}

/// The `RoomControllerActor` implementation.
pub struct RoomControllerActor {
    receiver: mpsc::Receiver<ControllerMessage>,
    /// Handed to rooms so they can report `RoomIdle`.
    sender: mpsc::Sender<ControllerMessage>,
    /// Root token.
    cancel_token: CancellationToken,
    rooms: HashMap<RoomId, ManagedRoom>,
    accepting_new: bool,
    room_capacity: usize,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
    /// Bound on waiting for rooms during graceful shutdown.
    shutdown_deadline: Duration,
}

impl RoomControllerActor {
    fn new(
        receiver: mpsc::Receiver<ControllerMessage>,
        sender: mpsc::Sender<ControllerMessage>,
        cancel_token: CancellationToken,
        room_capacity: usize,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        Self {
            receiver,
            sender,
            cancel_token,
            rooms: HashMap::new(),
            accepting_new: true,
            room_capacity,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Controller, "controller"),
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
        }
    }

    #[instrument(skip_all, name = "relay.actor.controller")]
    async fn run(mut self) {
        info!(
            target: "relay.actor.controller",
            "RoomControllerActor started"
        );

        loop {
            // Check for terminated room actors
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "relay.actor.controller",
                        "RoomControllerActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "relay.actor.controller",
                                "RoomControllerActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "relay.actor.controller",
            rooms_remaining = self.rooms.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomControllerActor stopped"
        );
    }

    async fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::OpenChannel {
                room_id,
                channel,
                respond_to,
            } => {
                let result = self.open_channel(room_id, channel).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::RoomIdle { room_id } => {
                self.retire_if_idle(&room_id).await;
            }

            ControllerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            ControllerMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let result = self.initiate_shutdown(deadline);
                let _ = respond_to.send(result);
            }
        }
    }

    async fn open_channel(
        &mut self,
        room_id: RoomId,
        channel: ChannelHandle,
    ) -> Result<RoomActorHandle, RelayError> {
        if !self.accepting_new {
            return Err(RelayError::Draining);
        }

        let handle = match self.rooms.get(&room_id) {
            Some(managed) => managed.handle.clone(),
            None => self.create_room(room_id),
        };

        handle.channel_opened(channel).await?;
        Ok(handle)
    }

    fn create_room(&mut self, room_id: RoomId) -> RoomActorHandle {
        let (handle, task_handle) = RoomActor::spawn(
            room_id.clone(),
            self.room_capacity,
            self.cancel_token.child_token(),
            self.sender.clone(),
            Arc::clone(&self.metrics),
        );

        self.rooms.insert(
            room_id.clone(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
            },
        );
        self.metrics.room_created();

        info!(
            target: "relay.actor.controller",
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room actor created"
        );

        handle
    }

    /// Remove a room that reported itself idle, unless a channel was opened
    /// on it in the meantime.
    async fn retire_if_idle(&mut self, room_id: &RoomId) {
        let Some(managed) = self.rooms.get(room_id) else {
            return;
        };

        match managed.handle.close_if_idle().await {
            Ok(false) => {
                debug!(
                    target: "relay.actor.controller",
                    room_id = %room_id,
                    "Room no longer idle, keeping"
                );
                return;
            }
            Ok(true) => {}
            Err(e) => {
                warn!(
                    target: "relay.actor.controller",
                    room_id = %room_id,
                    error = %e,
                    "Room did not answer idle check, removing"
                );
            }
        }

        if let Some(managed) = self.rooms.remove(room_id) {
            // Detach from the room task; it has already left its loop
            drop(managed.task_handle);
            self.metrics.room_removed();
            info!(
                target: "relay.actor.controller",
                room_id = %room_id,
                total_rooms = self.rooms.len(),
                "Room actor removed"
            );
        }
    }

    fn get_status(&self) -> ControllerStatus {
        ControllerStatus {
            room_count: self.rooms.len(),
            connection_count: self.metrics.connection_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    fn initiate_shutdown(&mut self, deadline: Duration) -> Result<(), RelayError> {
        info!(
            target: "relay.actor.controller",
            room_count = self.rooms.len(),
            deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;
        self.shutdown_deadline = deadline;

        // Propagates to every room and channel
        self.cancel_token.cancel();

        Ok(())
    }

    async fn graceful_shutdown(&mut self) {
        info!(
            target: "relay.actor.controller",
            room_count = self.rooms.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        // One deadline for all rooms, not one per room
        let deadline_at = tokio::time::Instant::now() + self.shutdown_deadline;
        for (room_id, managed) in self.rooms.drain() {
            match tokio::time::timeout_at(deadline_at, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "relay.actor.controller",
                        room_id = %room_id,
                        "Room actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "relay.actor.controller",
                        room_id = %room_id,
                        error = ?e,
                        "Room actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "relay.actor.controller",
                        room_id = %room_id,
                        "Room actor shutdown timed out"
                    );
                }
            }
            self.metrics.room_removed();
        }

        info!(
            target: "relay.actor.controller",
            "Graceful shutdown complete"
        );
    }

    /// Remove room actors whose task ended without being retired.
    async fn check_room_health(&mut self) {
        let finished: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(room_id, _)| room_id.clone())
            .collect();

        for room_id in finished {
            let Some(managed) = self.rooms.remove(&room_id) else {
                continue;
            };

            match managed.task_handle.await {
                Ok(()) => {
                    info!(
                        target: "relay.actor.controller",
                        room_id = %room_id,
                        "Room actor exited"
                    );
                }
                Err(join_error) if join_error.is_panic() => {
                    error!(
                        target: "relay.actor.controller",
                        room_id = %room_id,
                        error = ?join_error,
                        "Room actor panicked"
                    );
                    self.metrics.record_panic(ActorType::Room);
                }
                Err(join_error) => {
                    warn!(
                        target: "relay.actor.controller",
                        room_id = %room_id,
                        error = ?join_error,
                        "Room actor task cancelled"
                    );
                }
            }

            self.metrics.room_removed();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::room::test_handle;
    use relay_test_utils::TestParticipant;

    #[tokio::test]
    async fn test_open_channel_creates_room_once() {
        let metrics = ActorMetrics::new();
        let controller = RoomControllerActorHandle::new(0, Arc::clone(&metrics));

        let mut a = TestParticipant::new("alice").open(8);
        let mut b = TestParticipant::new("bob").open(8);
        let room_a = controller
            .open_channel(RoomId::default(), test_handle(&a))
            .await
            .unwrap();
        let room_b = controller
            .open_channel(RoomId::default(), test_handle(&b))
            .await
            .unwrap();

        assert_eq!(room_a.room_id(), room_b.room_id());
        assert_eq!(a.recorder.next_described(1).await, vec!["welcome"]);
        assert_eq!(b.recorder.next_described(1).await, vec!["welcome"]);

        let status = controller.get_status().await.unwrap();
        assert_eq!(status.room_count, 1);
        assert_eq!(status.connection_count, 2);
        assert!(!status.is_draining);

        controller.cancel();
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let controller = RoomControllerActorHandle::new(0, ActorMetrics::new());

        let a = TestParticipant::new("alice").open(8);
        let b = TestParticipant::new("bob").open(8);
        let lobby = controller
            .open_channel(RoomId::from("lobby"), test_handle(&a))
            .await
            .unwrap();
        let studio = controller
            .open_channel(RoomId::from("studio"), test_handle(&b))
            .await
            .unwrap();

        assert_ne!(lobby.room_id(), studio.room_id());
        assert_eq!(controller.get_status().await.unwrap().room_count, 2);
        controller.cancel();
    }

    #[tokio::test]
    async fn test_room_removed_after_last_channel_closes() {
        let controller = RoomControllerActorHandle::new(0, ActorMetrics::new());
        let a = TestParticipant::new("alice").open(8);
        let room = controller
            .open_channel(RoomId::default(), test_handle(&a))
            .await
            .unwrap();

        room.channel_closed(a.endpoint_id()).await.unwrap();

        let mut removed = false;
        for _ in 0..50 {
            if controller.get_status().await.unwrap().room_count == 0 {
                removed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(removed, "idle room should be removed");

        // A new channel gets a fresh room
        let b = TestParticipant::new("bob").open(8);
        controller
            .open_channel(RoomId::default(), test_handle(&b))
            .await
            .unwrap();
        assert_eq!(controller.get_status().await.unwrap().room_count, 1);
        controller.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_channels() {
        let controller = RoomControllerActorHandle::new(0, ActorMetrics::new());
        let a = TestParticipant::new("alice").open(8);
        controller
            .open_channel(RoomId::default(), test_handle(&a))
            .await
            .unwrap();

        controller.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(controller.is_cancelled());

        tokio::time::timeout(Duration::from_secs(1), a.cancel_token.cancelled())
            .await
            .unwrap();

        let b = TestParticipant::new("bob").open(8);
        let result = controller
            .open_channel(RoomId::default(), test_handle(&b))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_shutdown_honours_requested_deadline() {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let metrics = ActorMetrics::new();
        let cancel_token = CancellationToken::new();
        let (handle, _room_task) = RoomActor::spawn(
            RoomId::default(),
            0,
            cancel_token.child_token(),
            sender.clone(),
            Arc::clone(&metrics),
        );
        let mut actor = RoomControllerActor::new(receiver, sender, cancel_token, 0, metrics);

        // A room task that never finishes
        actor.rooms.insert(
            RoomId::default(),
            ManagedRoom {
                handle,
                task_handle: tokio::spawn(std::future::pending::<()>()),
            },
        );

        actor.initiate_shutdown(Duration::from_secs(2)).unwrap();
        let started = tokio::time::Instant::now();
        actor.graceful_shutdown().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < DEFAULT_SHUTDOWN_DEADLINE);
        assert!(actor.rooms.is_empty());
        assert!(actor.cancel_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_token_follows_controller() {
        let controller = RoomControllerActorHandle::new(0, ActorMetrics::new());
        let child = controller.child_token();
        assert!(!child.is_cancelled());
        controller.cancel();
        assert!(child.is_cancelled());
    }
}
