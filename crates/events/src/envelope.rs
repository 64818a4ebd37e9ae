use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use meetpay_core::{InviteId, UserId};

use crate::Event;

/// Envelope for a lifecycle event, carrying routing metadata.
///
/// Notes:
/// - `participants` are the identities the feed routes this event to
///   (the invite's creator and, once booked, its invitee).
/// - `sequence_number` is the invite version the transition committed at;
///   subscribers can use it to discard stale hints, never to rebuild state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    invite_id: InviteId,
    participants: Vec<UserId>,

    /// Invite version after the committed transition.
    sequence_number: u64,

    event_type: String,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        invite_id: InviteId,
        participants: Vec<UserId>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        let mut participants = participants;
        participants.sort();
        participants.dedup();

        Self {
            event_id,
            invite_id,
            participants,
            sequence_number,
            event_type: payload.event_type().to_string(),
            occurred_at: payload.occurred_at(),
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn invite_id(&self) -> InviteId {
        self.invite_id
    }

    pub fn participants(&self) -> &[UserId] {
        &self.participants
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
