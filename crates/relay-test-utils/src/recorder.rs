//! Outbound queue recorder.

use room_protocol::{ChatKind, ChatMessage, EndpointId, ServerEvent};
use std::time::Duration;
use tokio::sync::mpsc;

/// Default wait for an event that is expected to arrive.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Compact description of an event for order assertions.
///
/// | Event | Description |
/// |-------|-------------|
/// | welcome | `welcome` |
/// | live user-joined | `joined:<name>` |
/// | replayed user-joined | `present:<name>` |
/// | user-left | `left:<name>` |
/// | system chat | `system:<content>` |
/// | user chat | `chat:<name>:<content>` |
/// | offer / answer / candidate | `offer` / `answer` / `candidate` |
#[must_use]
pub fn describe(event: &ServerEvent) -> String {
    match event {
        ServerEvent::Welcome { .. } => "welcome".to_string(),
        ServerEvent::UserJoined {
            display_name,
            existing: false,
            ..
        } => format!("joined:{display_name}"),
        ServerEvent::UserJoined {
            display_name,
            existing: true,
            ..
        } => format!("present:{display_name}"),
        ServerEvent::UserLeft { display_name, .. } => format!("left:{display_name}"),
        ServerEvent::ChatMessage(ChatMessage {
            kind: ChatKind::System,
            content,
            ..
        }) => format!("system:{content}"),
        ServerEvent::ChatMessage(ChatMessage {
            content,
            display_name,
            ..
        }) => format!("chat:{}:{content}", display_name.as_deref().unwrap_or("?")),
        ServerEvent::Offer { .. } => "offer".to_string(),
        ServerEvent::Answer { .. } => "answer".to_string(),
        ServerEvent::Candidate { .. } => "candidate".to_string(),
    }
}

/// Receiving end of a participant's outbound queue.
#[derive(Debug)]
pub struct EventRecorder {
    endpoint_id: EndpointId,
    receiver: mpsc::Receiver<ServerEvent>,
}

impl EventRecorder {
    #[must_use]
    pub fn new(endpoint_id: EndpointId, receiver: mpsc::Receiver<ServerEvent>) -> Self {
        Self {
            endpoint_id,
            receiver,
        }
    }

    #[must_use]
    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    /// Everything queued so far, without waiting.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// `drain()` mapped through [`describe`].
    pub fn drain_described(&mut self) -> Vec<String> {
        self.drain().iter().map(describe).collect()
    }

    /// Wait for the next event.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`EVENT_TIMEOUT`] or the queue closed.
    pub async fn next(&mut self) -> ServerEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.receiver.recv())
            .await
            .unwrap_or_else(|_| panic!("no event for {} within timeout", self.endpoint_id))
            .unwrap_or_else(|| panic!("queue for {} closed", self.endpoint_id))
    }

    /// Wait until `count` events have arrived and describe them.
    pub async fn next_described(&mut self, count: usize) -> Vec<String> {
        let mut described = Vec::with_capacity(count);
        for _ in 0..count {
            described.push(describe(&self.next().await));
        }
        described
    }

    /// Close the queue so that further writes fail.
    pub fn close(&mut self) {
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_describe_vocabulary() {
        let id = EndpointId::new();
        assert_eq!(
            describe(&ServerEvent::UserJoined {
                endpoint_id: id,
                display_name: "a".to_string(),
                existing: true,
            }),
            "present:a"
        );
        assert_eq!(
            describe(&ServerEvent::ChatMessage(ChatMessage::user(
                "hello",
                "a",
                id,
                Utc::now()
            ))),
            "chat:a:hello"
        );
        assert_eq!(
            describe(&ServerEvent::Candidate {
                from_endpoint_id: id,
                payload: json!({}),
            }),
            "candidate"
        );
    }
}
