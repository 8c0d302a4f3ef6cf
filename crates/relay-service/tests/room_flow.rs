//! Room flows driven through the controller with in-memory channels.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use relay_service::actors::{ActorMetrics, RoomActorHandle, RoomControllerActorHandle};
use relay_service::room::ChannelHandle;
use relay_test_utils::{TestChannel, TestParticipant};
use room_protocol::{ClientEvent, EndpointId, RoomId, ServerEvent};
use serde_json::json;

struct Room {
    controller: RoomControllerActorHandle,
    handle: Option<RoomActorHandle>,
}

impl Room {
    fn new() -> Self {
        Self {
            controller: RoomControllerActorHandle::new(0, ActorMetrics::new()),
            handle: None,
        }
    }

    fn handle(&self) -> &RoomActorHandle {
        self.handle.as_ref().expect("no channel opened yet")
    }

    /// Open a channel and join under the participant's name. The returned
    /// channel has consumed its `welcome`.
    async fn join(&mut self, name: &str) -> TestChannel {
        let participant = TestParticipant::new(name);
        let join = participant.join_event();
        let mut channel = participant.open(64);

        let handle = self
            .controller
            .open_channel(
                RoomId::default(),
                ChannelHandle::new(
                    channel.endpoint_id(),
                    channel.sender.clone(),
                    channel.cancel_token.clone(),
                ),
            )
            .await
            .unwrap();
        assert_eq!(channel.recorder.next_described(1).await, vec!["welcome"]);

        handle.client_event(channel.endpoint_id(), join).await.unwrap();
        self.handle = Some(handle);
        channel
    }

    async fn send(&self, from: &TestChannel, event: ClientEvent) {
        self.handle()
            .client_event(from.endpoint_id(), event)
            .await
            .unwrap();
    }

    async fn close(&self, channel: &TestChannel) {
        self.handle()
            .channel_closed(channel.endpoint_id())
            .await
            .unwrap();
    }

    /// Wait until every queued message has been handled.
    async fn settle(&self) {
        self.handle().get_state().await.unwrap();
    }
}

#[tokio::test]
async fn test_presence_precedes_system_line_for_each_recipient() {
    let mut room = Room::new();
    let mut alice = room.join("alice").await;
    let mut bob = room.join("bob").await;
    let mut carol = room.join("carol").await;
    room.settle().await;

    assert_eq!(
        alice.recorder.drain_described(),
        vec![
            "system:alice joined the chat",
            "joined:bob",
            "system:bob joined the chat",
            "joined:carol",
            "system:carol joined the chat",
        ]
    );
    assert_eq!(
        bob.recorder.drain_described(),
        vec![
            "present:alice",
            "system:bob joined the chat",
            "joined:carol",
            "system:carol joined the chat",
        ]
    );
    assert_eq!(
        carol.recorder.drain_described(),
        vec![
            "present:alice",
            "present:bob",
            "system:carol joined the chat",
        ]
    );
}

#[tokio::test]
async fn test_chat_reaches_everyone_with_registry_name() {
    let mut room = Room::new();
    let mut alice = room.join("alice").await;
    let mut bob = room.join("bob").await;
    room.settle().await;
    alice.recorder.drain();
    bob.recorder.drain();

    room.send(
        &bob,
        ClientEvent::ChatMessage {
            content: "  hi all ".to_string(),
        },
    )
    .await;
    room.settle().await;

    assert_eq!(alice.recorder.drain_described(), vec!["chat:bob:hi all"]);
    let events = bob.recorder.drain();
    match events.first() {
        Some(ServerEvent::ChatMessage(message)) => {
            assert_eq!(message.sender_endpoint_id, Some(bob.endpoint_id()));
            assert_eq!(message.display_name.as_deref(), Some("bob"));
            assert_eq!(message.content, "hi all");
        }
        other => panic!("expected chat message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_signaling_is_stamped_and_targeted() {
    let mut room = Room::new();
    let mut alice = room.join("alice").await;
    let mut bob = room.join("bob").await;
    let mut carol = room.join("carol").await;
    room.settle().await;
    alice.recorder.drain();
    bob.recorder.drain();
    carol.recorder.drain();

    room.send(
        &bob,
        ClientEvent::Offer {
            target_endpoint_id: alice.endpoint_id(),
            payload: json!({"sdp": "v=0"}),
        },
    )
    .await;
    room.settle().await;

    assert_eq!(
        alice.recorder.drain(),
        vec![ServerEvent::Offer {
            from_endpoint_id: bob.endpoint_id(),
            payload: json!({"sdp": "v=0"}),
        }]
    );
    assert!(bob.recorder.drain().is_empty());
    assert!(carol.recorder.drain().is_empty());
}

#[tokio::test]
async fn test_candidate_to_departed_endpoint_is_dropped() {
    let mut room = Room::new();
    let mut alice = room.join("alice").await;
    let bob = room.join("bob").await;
    let mut carol = room.join("carol").await;

    room.close(&bob).await;
    room.settle().await;
    alice.recorder.drain();
    carol.recorder.drain();

    room.send(
        &alice,
        ClientEvent::Candidate {
            target_endpoint_id: bob.endpoint_id(),
            payload: json!({"candidate": "stale"}),
        },
    )
    .await;
    room.send(
        &alice,
        ClientEvent::Candidate {
            target_endpoint_id: carol.endpoint_id(),
            payload: json!({"candidate": "fresh"}),
        },
    )
    .await;
    room.settle().await;

    assert!(alice.recorder.drain().is_empty());
    assert_eq!(carol.recorder.drain_described(), vec!["candidate"]);
    let state = room.handle().get_state().await.unwrap();
    assert_eq!(state.participants.len(), 2);
}

#[tokio::test]
async fn test_closing_twice_broadcasts_once() {
    let mut room = Room::new();
    let mut alice = room.join("alice").await;
    let bob = room.join("bob").await;
    room.settle().await;
    alice.recorder.drain();

    room.close(&bob).await;
    room.close(&bob).await;
    room.settle().await;

    assert_eq!(
        alice.recorder.drain_described(),
        vec!["left:bob", "system:bob left the chat"]
    );
}

#[tokio::test]
async fn test_closed_queue_is_evicted_and_announced() {
    let mut room = Room::new();
    let mut alice = room.join("alice").await;
    let mut bob = room.join("bob").await;
    room.settle().await;
    alice.recorder.drain();

    bob.close_receiver();
    room.send(
        &alice,
        ClientEvent::ChatMessage {
            content: "anyone there?".to_string(),
        },
    )
    .await;
    room.settle().await;

    assert_eq!(
        alice.recorder.drain_described(),
        vec![
            "chat:alice:anyone there?",
            "left:bob",
            "system:bob left the chat",
        ]
    );
    assert!(bob.cancel_token.is_cancelled());

    let state = room.handle().get_state().await.unwrap();
    let names: Vec<&str> = state
        .participants
        .iter()
        .map(|p| p.display_name.as_str())
        .collect();
    assert_eq!(names, vec!["alice"]);
}

#[tokio::test]
async fn test_signaling_from_unjoined_channel_is_dropped() {
    let mut room = Room::new();
    let mut alice = room.join("alice").await;
    room.settle().await;
    alice.recorder.drain();

    let lurker = TestParticipant::new("lurker").open(8);
    room.controller
        .open_channel(
            RoomId::default(),
            ChannelHandle::new(
                lurker.endpoint_id(),
                lurker.sender.clone(),
                lurker.cancel_token.clone(),
            ),
        )
        .await
        .unwrap();

    room.send(
        &lurker,
        ClientEvent::Offer {
            target_endpoint_id: alice.endpoint_id(),
            payload: json!({}),
        },
    )
    .await;
    room.send(
        &lurker,
        ClientEvent::ChatMessage {
            content: "hello?".to_string(),
        },
    )
    .await;
    room.settle().await;

    assert!(alice.recorder.drain().is_empty());
    let state = room.handle().get_state().await.unwrap();
    assert_eq!(state.open_channels, 2);
    assert_eq!(state.participants.len(), 1);
}

#[tokio::test]
async fn test_duplicate_endpoint_channel_rejected() {
    let controller = RoomControllerActorHandle::new(0, ActorMetrics::new());
    let shared = EndpointId::new();

    let first = TestParticipant::new("alice")
        .with_endpoint_id(shared)
        .open(8);
    controller
        .open_channel(
            RoomId::from("one"),
            ChannelHandle::new(shared, first.sender.clone(), first.cancel_token.clone()),
        )
        .await
        .unwrap();

    let again = TestParticipant::new("alice")
        .with_endpoint_id(shared)
        .open(8);
    let result = controller
        .open_channel(
            RoomId::from("one"),
            ChannelHandle::new(shared, again.sender.clone(), again.cancel_token.clone()),
        )
        .await;
    assert!(result.is_err());
}
