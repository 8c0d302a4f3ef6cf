//! Client chat feed and roster.
//!
//! Local lines are echoed as soon as they are sent. The relay's fan-out copy
//! of the client's own line is recognized by `senderEndpointId` and dropped,
//! so each line shows up exactly once.

use chrono::{DateTime, Utc};
use room_protocol::{ChatKind, ChatMessage, ClientEvent, EndpointId, ServerEvent};

/// One line of the chat feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub kind: ChatKind,
    pub content: String,
    /// `None` for system lines.
    pub display_name: Option<String>,
    /// Sent by this client.
    pub own: bool,
    pub timestamp: DateTime<Utc>,
}

/// A remote participant known to this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub endpoint_id: EndpointId,
    pub display_name: String,
}

/// Chat feed plus roster of remote participants.
#[derive(Debug, Default)]
pub struct ChatFeed {
    local_endpoint_id: Option<EndpointId>,
    local_name: String,
    lines: Vec<ChatLine>,
    roster: Vec<RosterEntry>,
}

impl ChatFeed {
    #[must_use]
    pub fn new(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn lines(&self) -> &[ChatLine] {
        &self.lines
    }

    /// Remote participants in the order they became known.
    #[must_use]
    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    /// Echo a local line and return the event to send, or `None` if the
    /// content is blank.
    pub fn compose(&mut self, content: &str) -> Option<ClientEvent> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }

        self.lines.push(ChatLine {
            kind: ChatKind::User,
            content: content.to_string(),
            display_name: Some(self.local_name.clone()),
            own: true,
            timestamp: Utc::now(),
        });

        Some(ClientEvent::ChatMessage {
            content: content.to_string(),
        })
    }

    /// Apply one relay event.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Welcome { endpoint_id, .. } => {
                self.local_endpoint_id = Some(*endpoint_id);
            }
            ServerEvent::UserJoined {
                endpoint_id,
                display_name,
                ..
            } => {
                let known = self.roster.iter().any(|e| e.endpoint_id == *endpoint_id);
                if Some(*endpoint_id) != self.local_endpoint_id && !known {
                    self.roster.push(RosterEntry {
                        endpoint_id: *endpoint_id,
                        display_name: display_name.clone(),
                    });
                }
            }
            ServerEvent::UserLeft { endpoint_id, .. } => {
                self.roster.retain(|e| e.endpoint_id != *endpoint_id);
            }
            ServerEvent::ChatMessage(message) => self.receive(message),
            ServerEvent::Offer { .. } | ServerEvent::Answer { .. } | ServerEvent::Candidate { .. } => {}
        }
    }

    /// Forget the roster, e.g. after leaving the room.
    pub fn clear_roster(&mut self) {
        self.roster.clear();
    }

    fn receive(&mut self, message: &ChatMessage) {
        let own = message.sender_endpoint_id.is_some()
            && message.sender_endpoint_id == self.local_endpoint_id;
        if message.kind == ChatKind::User && own {
            // Already echoed by `compose`
            return;
        }

        self.lines.push(ChatLine {
            kind: message.kind,
            content: message.content.clone(),
            display_name: message.display_name.clone(),
            own: false,
            timestamp: message.timestamp,
        });
    }
}
