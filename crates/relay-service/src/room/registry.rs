//! Participant registry for one room.
//!
//! Owned exclusively by the room actor, so every mutation is already
//! serialized and `list()` never sees a half-applied admit or evict.

use crate::errors::RelayError;
use crate::room::channel::ChannelHandle;

use chrono::{DateTime, Utc};
use room_protocol::{EndpointId, RoomId};
use std::collections::HashMap;

/// An admitted identity bound to one relay channel.
#[derive(Debug, Clone)]
pub struct Participant {
    pub endpoint_id: EndpointId,
    pub display_name: String,
    /// Externally authenticated user id, carried through when supplied.
    pub user_id: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub channel: ChannelHandle,
}

impl Participant {
    #[must_use]
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            endpoint_id: self.endpoint_id,
            display_name: self.display_name.clone(),
            user_id: self.user_id.clone(),
            joined_at: self.joined_at,
        }
    }
}

/// Snapshot of a participant without its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub endpoint_id: EndpointId,
    pub display_name: String,
    pub user_id: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// In-memory set of joined participants, keyed by endpoint, insertion ordered.
#[derive(Debug)]
pub struct ParticipantRegistry {
    room_id: RoomId,
    order: Vec<EndpointId>,
    participants: HashMap<EndpointId, Participant>,
    /// Zero means unlimited.
    capacity: usize,
}

impl ParticipantRegistry {
    #[must_use]
    pub fn new(room_id: RoomId) -> Self {
        Self::with_capacity_limit(room_id, 0)
    }

    #[must_use]
    pub fn with_capacity_limit(room_id: RoomId, capacity: usize) -> Self {
        Self {
            room_id,
            order: Vec::new(),
            participants: HashMap::new(),
            capacity,
        }
    }

    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Admit a participant. The first admission of an endpoint wins.
    ///
    /// # Errors
    ///
    /// - `DuplicateEndpoint` if the endpoint is already registered
    /// - `RoomFull` if the capacity limit is reached
    pub fn admit(
        &mut self,
        endpoint_id: EndpointId,
        display_name: String,
        user_id: Option<String>,
        joined_at: DateTime<Utc>,
        channel: ChannelHandle,
    ) -> Result<Participant, RelayError> {
        if self.participants.contains_key(&endpoint_id) {
            return Err(RelayError::DuplicateEndpoint(endpoint_id));
        }
        if self.capacity > 0 && self.participants.len() >= self.capacity {
            return Err(RelayError::RoomFull(self.room_id.clone()));
        }

        let participant = Participant {
            endpoint_id,
            display_name,
            user_id,
            joined_at,
            channel,
        };
        self.order.push(endpoint_id);
        self.participants.insert(endpoint_id, participant.clone());
        Ok(participant)
    }

    /// Remove a participant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the endpoint is not registered.
    pub fn evict(&mut self, endpoint_id: EndpointId) -> Result<Participant, RelayError> {
        let participant = self
            .participants
            .remove(&endpoint_id)
            .ok_or(RelayError::NotFound(endpoint_id))?;
        self.order.retain(|id| *id != endpoint_id);
        Ok(participant)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the endpoint is not registered.
    pub fn lookup(&self, endpoint_id: EndpointId) -> Result<&Participant, RelayError> {
        self.participants
            .get(&endpoint_id)
            .ok_or(RelayError::NotFound(endpoint_id))
    }

    /// Insertion-ordered snapshot.
    #[must_use]
    pub fn list(&self) -> Vec<ParticipantInfo> {
        self.iter().map(Participant::info).collect()
    }

    /// Participants in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.order
            .iter()
            .filter_map(|id| self.participants.get(id))
    }

    #[must_use]
    pub fn contains(&self, endpoint_id: EndpointId) -> bool {
        self.participants.contains_key(&endpoint_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
