//! Read projections over an invite's composite state.
//!
//! These are the only place "pending", "upcoming" and "past" are computed.
//! Every consumer (listings, dashboards, caches) goes through them instead of
//! re-deriving views from raw rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meetpay_booking::{Booking, BookingStatus};
use meetpay_core::{DomainError, UserId};
use meetpay_escrow::EscrowRecord;

use crate::invite::{Invite, InviteStatus};

/// Where an invite (or a booking) stands from a participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Published, nobody has booked it yet.
    Pending,
    /// Booked for a time that has not arrived.
    Upcoming,
    /// Booked time has passed, the creator has not confirmed yet.
    AwaitingConfirmation,
    Completed,
    Cancelled,
}

impl Phase {
    /// Phase of a booking seen on its own (the invitee's listing).
    pub fn of_booking(booking: &Booking, now: DateTime<Utc>) -> Self {
        match booking.status() {
            BookingStatus::Completed => Phase::Completed,
            BookingStatus::Cancelled => Phase::Cancelled,
            BookingStatus::Scheduled if booking.scheduled_at() > now => Phase::Upcoming,
            BookingStatus::Scheduled => Phase::AwaitingConfirmation,
        }
    }

    pub fn is_past(self) -> bool {
        matches!(
            self,
            Phase::AwaitingConfirmation | Phase::Completed | Phase::Cancelled
        )
    }
}

/// Invite with its current booking and escrow record, as returned by
/// `get_invite`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteDetails {
    pub invite: Invite,
    /// The open booking, or the last cancelled one if none is open.
    pub booking: Option<Booking>,
    pub escrow: EscrowRecord,
}

impl InviteDetails {
    pub fn phase(&self, now: DateTime<Utc>) -> Phase {
        match self.invite.status() {
            InviteStatus::Active => Phase::Pending,
            InviteStatus::Completed => Phase::Completed,
            InviteStatus::Cancelled => Phase::Cancelled,
            InviteStatus::Booked => match &self.booking {
                Some(booking) => Phase::of_booking(booking, now),
                None => Phase::Pending,
            },
        }
    }

    /// Nobody has booked the invite yet.
    pub fn is_pending(&self) -> bool {
        self.invite.status() == InviteStatus::Active
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.phase(now) == Phase::Upcoming
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.phase(now).is_past()
    }

    /// The open booking, if the invite has one.
    pub fn open_booking(&self) -> Option<&Booking> {
        self.booking.as_ref().filter(|b| b.is_open())
    }

    /// Identities the invite's events are routed to: the creator and, once
    /// booked, the invitee.
    pub fn participants(&self) -> Vec<UserId> {
        let mut participants = vec![self.invite.creator_id().clone()];
        if let Some(booking) = &self.booking {
            participants.push(booking.invitee_id().clone());
        }
        participants
    }

    /// Check the composite against the status derivation and the invitee rule.
    pub fn check_consistency(&self) -> Result<(), DomainError> {
        let invite_id = self.invite.id_typed();

        if self.escrow.invite_id() != invite_id {
            return Err(DomainError::invariant(format!(
                "escrow {} does not belong to invite {invite_id}",
                self.escrow.id_typed()
            )));
        }

        if let Some(booking) = &self.booking {
            if booking.invite_id() != invite_id {
                return Err(DomainError::invariant(format!(
                    "booking {} does not belong to invite {invite_id}",
                    booking.id_typed()
                )));
            }
            if self.invite.is_creator(booking.invitee_id()) {
                return Err(DomainError::invariant(format!(
                    "booking {} was made by the invite's creator",
                    booking.id_typed()
                )));
            }
        }

        let derived = InviteStatus::derive(
            self.open_booking().is_some(),
            self.invite.meeting_confirmed(),
            self.escrow.status(),
        );
        if derived != self.invite.status() {
            return Err(DomainError::invariant(format!(
                "invite {invite_id} is {:?} but its records derive {derived:?}",
                self.invite.status()
            )));
        }
        Ok(())
    }
}
