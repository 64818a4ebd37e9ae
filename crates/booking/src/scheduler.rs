//! Booking scheduler.
//!
//! `book` is a conditional write: the booking is inserted only if the invite
//! is still open and no other open booking exists for it. The record store
//! enforces the "one open booking per invite" constraint at insert time and
//! again when the unit of work commits, so two racing callers can never both
//! win, whatever order their reads happened in.

use chrono::{DateTime, Utc};

use meetpay_core::{BookingId, DomainError, InviteId, UserId};

use crate::booking::Booking;
use crate::slots::SlotPolicy;

/// Booking record access, provided by the caller's unit of work.
pub trait BookingRecords {
    /// The invite's booking whose status is not `Cancelled`, if any.
    fn open_booking(&mut self, invite_id: InviteId) -> Result<Option<Booking>, DomainError>;

    /// Insert a new booking. Must fail with `DomainError::Conflict` if the
    /// invite already has an open booking.
    fn insert_booking(&mut self, booking: Booking) -> Result<(), DomainError>;

    /// Stage an updated version of an existing booking.
    fn update_booking(&mut self, booking: Booking) -> Result<(), DomainError>;
}

/// The parts of an invite the scheduler checks before booking.
#[derive(Debug, Clone, Copy)]
pub struct BookingTarget<'a> {
    pub invite_id: InviteId,
    pub creator_id: &'a UserId,
    /// Whether the invite still accepts bookings (status `Active`).
    pub accepting: bool,
    /// Normalized offered slots; empty means any future time.
    pub slots: &'a [DateTime<Utc>],
}

#[derive(Debug, Clone, Default)]
pub struct BookingScheduler {
    policy: SlotPolicy,
}

impl BookingScheduler {
    pub fn new(policy: SlotPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SlotPolicy {
        &self.policy
    }

    /// Claim `scheduled_at` on the target invite for `invitee_id`.
    pub fn book<R>(
        &self,
        records: &mut R,
        target: BookingTarget<'_>,
        invitee_id: &UserId,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Booking, DomainError>
    where
        R: BookingRecords + ?Sized,
    {
        if invitee_id == target.creator_id {
            return Err(DomainError::unauthorized("creator cannot book their own invite"));
        }
        if !target.accepting {
            return Err(DomainError::conflict(format!(
                "invite {} is no longer accepting bookings",
                target.invite_id
            )));
        }
        self.policy.check_choice(target.slots, scheduled_at, now)?;

        if let Some(existing) = records.open_booking(target.invite_id)? {
            return Err(DomainError::conflict(format!(
                "invite {} already booked ({})",
                target.invite_id,
                existing.id_typed()
            )));
        }

        let booking = Booking::scheduled(
            BookingId::new(),
            target.invite_id,
            invitee_id.clone(),
            scheduled_at,
            now,
        );
        records.insert_booking(booking.clone())?;

        tracing::debug!(
            invite_id = %target.invite_id,
            booking_id = %booking.id_typed(),
            "booking staged"
        );
        Ok(booking)
    }

    /// Mark the invite's open booking completed.
    ///
    /// Returns the booking as staged; already-completed bookings are returned
    /// unchanged and nothing is staged.
    pub fn complete<R>(
        &self,
        records: &mut R,
        invite_id: InviteId,
        now: DateTime<Utc>,
    ) -> Result<Booking, DomainError>
    where
        R: BookingRecords + ?Sized,
    {
        let mut booking = records
            .open_booking(invite_id)?
            .ok_or_else(|| DomainError::invariant(format!("invite {invite_id} has no open booking")))?;

        if booking.complete(now)? {
            records.update_booking(booking.clone())?;
        }
        Ok(booking)
    }

    /// Cancel the invite's open booking, if there is one.
    pub fn cancel<R>(
        &self,
        records: &mut R,
        invite_id: InviteId,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, DomainError>
    where
        R: BookingRecords + ?Sized,
    {
        let Some(mut booking) = records.open_booking(invite_id)? else {
            return Ok(None);
        };

        if booking.cancel(now)? {
            records.update_booking(booking.clone())?;
        }
        Ok(Some(booking))
    }
}
