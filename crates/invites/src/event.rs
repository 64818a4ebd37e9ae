use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meetpay_booking::Booking;
use meetpay_core::{BookingId, InviteId, Money, UserId};
use meetpay_events::Event;

use crate::invite::Invite;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCreated {
    pub invite_id: InviteId,
    pub creator_id: UserId,
    pub title: String,
    pub money: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteBooked {
    pub invite_id: InviteId,
    pub booking_id: BookingId,
    pub invitee_id: UserId,
    pub scheduled_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingConfirmed {
    pub invite_id: InviteId,
    pub booking_id: BookingId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCancelled {
    pub invite_id: InviteId,
    /// The booking cancelled alongside the invite, if it had one.
    pub booking_id: Option<BookingId>,
    pub occurred_at: DateTime<Utc>,
}

/// Lifecycle events emitted on the notification feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InviteEvent {
    Created(InviteCreated),
    Booked(InviteBooked),
    Confirmed(MeetingConfirmed),
    Cancelled(InviteCancelled),
}

impl InviteEvent {
    pub fn created(invite: &Invite) -> Self {
        InviteEvent::Created(InviteCreated {
            invite_id: invite.id_typed(),
            creator_id: invite.creator_id().clone(),
            title: invite.title().to_string(),
            money: invite.money().clone(),
            occurred_at: invite.updated_at(),
        })
    }

    pub fn booked(booking: &Booking) -> Self {
        InviteEvent::Booked(InviteBooked {
            invite_id: booking.invite_id(),
            booking_id: booking.id_typed(),
            invitee_id: booking.invitee_id().clone(),
            scheduled_at: booking.scheduled_at(),
            occurred_at: booking.updated_at(),
        })
    }

    pub fn confirmed(booking: &Booking) -> Self {
        InviteEvent::Confirmed(MeetingConfirmed {
            invite_id: booking.invite_id(),
            booking_id: booking.id_typed(),
            occurred_at: booking.updated_at(),
        })
    }

    pub fn cancelled(invite: &Invite, booking: Option<&Booking>) -> Self {
        InviteEvent::Cancelled(InviteCancelled {
            invite_id: invite.id_typed(),
            booking_id: booking.map(Booking::id_typed),
            occurred_at: invite.updated_at(),
        })
    }

    pub fn invite_id(&self) -> InviteId {
        match self {
            InviteEvent::Created(e) => e.invite_id,
            InviteEvent::Booked(e) => e.invite_id,
            InviteEvent::Confirmed(e) => e.invite_id,
            InviteEvent::Cancelled(e) => e.invite_id,
        }
    }
}

impl Event for InviteEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InviteEvent::Created(_) => "invite.created",
            InviteEvent::Booked(_) => "invite.booked",
            InviteEvent::Confirmed(_) => "invite.confirmed",
            InviteEvent::Cancelled(_) => "invite.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InviteEvent::Created(e) => e.occurred_at,
            InviteEvent::Booked(e) => e.occurred_at,
            InviteEvent::Confirmed(e) => e.occurred_at,
            InviteEvent::Cancelled(e) => e.occurred_at,
        }
    }
}
