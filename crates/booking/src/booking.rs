use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meetpay_core::{BookingId, DomainError, Entity, InviteId, UserId};

/// Booking status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Scheduled,
    Completed,
    Cancelled,
}

/// An invitee's claim on an invite's time slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    id: BookingId,
    invite_id: InviteId,
    invitee_id: UserId,
    scheduled_at: DateTime<Utc>,
    status: BookingStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn scheduled(
        id: BookingId,
        invite_id: InviteId,
        invitee_id: UserId,
        scheduled_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            invite_id,
            invitee_id,
            scheduled_at,
            status: BookingStatus::Scheduled,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn id_typed(&self) -> BookingId {
        self.id
    }

    pub fn invite_id(&self) -> InviteId {
        self.invite_id
    }

    pub fn invitee_id(&self) -> &UserId {
        &self.invitee_id
    }

    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Counts against the one-open-booking-per-invite constraint.
    pub fn is_open(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }

    /// Scheduled → Completed. Returns `false` if already completed.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<bool, DomainError> {
        self.transition(BookingStatus::Completed, at)
    }

    /// Scheduled → Cancelled. Returns `false` if already cancelled.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<bool, DomainError> {
        self.transition(BookingStatus::Cancelled, at)
    }

    fn transition(&mut self, target: BookingStatus, at: DateTime<Utc>) -> Result<bool, DomainError> {
        if self.status == target {
            return Ok(false);
        }
        if self.status != BookingStatus::Scheduled {
            return Err(DomainError::invariant(format!(
                "booking {} is {:?} and cannot become {:?}",
                self.id, self.status, target
            )));
        }
        self.status = target;
        self.updated_at = at;
        Ok(true)
    }
}

impl Entity for Booking {
    type Id = BookingId;
    type Owner = InviteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn owner(&self) -> &Self::Owner {
        &self.invite_id
    }
}
