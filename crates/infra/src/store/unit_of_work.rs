use std::collections::BTreeSet;

use meetpay_booking::{Booking, BookingRecords};
use meetpay_core::{AggregateRoot, BookingId, DomainError, ExpectedVersion, InviteId};
use meetpay_escrow::{EscrowError, EscrowRecord, EscrowRecords};
use meetpay_invites::{Invite, InviteDetails};

use super::r#trait::StoreError;

/// Committed records of one invite, as read when a unit of work begins.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub invite: Option<Invite>,
    pub bookings: Vec<Booking>,
    pub escrow: Option<EscrowRecord>,
}

/// Staged writes produced by a successful unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub invite_id: InviteId,
    /// Invite version the unit of work read; checked again at commit.
    pub expected: ExpectedVersion,
    pub invite: Option<Invite>,
    pub bookings: Vec<Booking>,
    pub escrow: Option<EscrowRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.invite.is_none() && self.bookings.is_empty() && self.escrow.is_none()
    }
}

/// Reads and staged writes over one invite's composite.
///
/// Reads see the snapshot taken at `begin` plus whatever this unit of work has
/// staged since. Nothing is visible to anyone else until the store commits the
/// resulting [`ChangeSet`].
#[derive(Debug)]
pub struct UnitOfWork {
    invite_id: InviteId,
    base_version: Option<u64>,
    invite: Option<Invite>,
    bookings: Vec<Booking>,
    escrow: Option<EscrowRecord>,
    invite_dirty: bool,
    dirty_bookings: BTreeSet<BookingId>,
    escrow_dirty: bool,
}

impl UnitOfWork {
    pub fn begin(invite_id: InviteId, snapshot: Snapshot) -> Self {
        Self {
            invite_id,
            base_version: snapshot.invite.as_ref().map(AggregateRoot::version),
            invite: snapshot.invite,
            bookings: snapshot.bookings,
            escrow: snapshot.escrow,
            invite_dirty: false,
            dirty_bookings: BTreeSet::new(),
            escrow_dirty: false,
        }
    }

    pub fn invite_id(&self) -> InviteId {
        self.invite_id
    }

    pub fn invite(&self) -> Option<&Invite> {
        self.invite.as_ref()
    }

    pub fn require_invite(&self) -> Result<Invite, DomainError> {
        self.invite
            .clone()
            .ok_or_else(|| DomainError::not_found(format!("invite {}", self.invite_id)))
    }

    pub fn escrow(&self) -> Option<&EscrowRecord> {
        self.escrow.as_ref()
    }

    pub fn require_escrow(&self) -> Result<EscrowRecord, DomainError> {
        self.escrow.clone().ok_or_else(|| {
            DomainError::invariant(format!("invite {} has no escrow record", self.invite_id))
        })
    }

    /// Stage the invite. Its version must be exactly one past the version
    /// this unit of work read (1 for a new invite).
    pub fn stage_invite(&mut self, invite: Invite) -> Result<(), StoreError> {
        if invite.id_typed() != self.invite_id {
            return Err(StoreError::InvalidChange(format!(
                "invite {} staged in unit of work for {}",
                invite.id_typed(),
                self.invite_id
            )));
        }
        let next = self.base_version.map_or(1, |v| v + 1);
        if invite.version() != next {
            return Err(StoreError::InvalidChange(format!(
                "invite {} staged at version {}, expected {next}",
                self.invite_id,
                invite.version()
            )));
        }

        self.invite = Some(invite);
        self.invite_dirty = true;
        Ok(())
    }

    /// The composite as this unit of work currently sees it; fails when the
    /// invite or its escrow record is missing.
    pub fn require_details(&self) -> Result<InviteDetails, DomainError> {
        Ok(InviteDetails {
            invite: self.require_invite()?,
            booking: latest_booking(&self.bookings).cloned(),
            escrow: self.require_escrow()?,
        })
    }

    pub fn into_changes(self) -> ChangeSet {
        let expected = match self.base_version {
            Some(v) => ExpectedVersion::Exact(v),
            None => ExpectedVersion::Absent,
        };
        let dirty = self.dirty_bookings;
        ChangeSet {
            invite_id: self.invite_id,
            expected,
            invite: self.invite.filter(|_| self.invite_dirty),
            bookings: self
                .bookings
                .into_iter()
                .filter(|b| dirty.contains(&b.id_typed()))
                .collect(),
            escrow: self.escrow.filter(|_| self.escrow_dirty),
        }
    }
}

/// The booking shown with an invite: the open one, else the newest.
pub(crate) fn latest_booking(bookings: &[Booking]) -> Option<&Booking> {
    bookings
        .iter()
        .find(|b| b.is_open())
        .or_else(|| bookings.iter().max_by_key(|b| (b.created_at(), b.id_typed())))
}

impl BookingRecords for UnitOfWork {
    fn open_booking(&mut self, invite_id: InviteId) -> Result<Option<Booking>, DomainError> {
        Ok(self
            .bookings
            .iter()
            .find(|b| b.invite_id() == invite_id && b.is_open())
            .cloned())
    }

    fn insert_booking(&mut self, booking: Booking) -> Result<(), DomainError> {
        if booking.invite_id() != self.invite_id {
            return Err(DomainError::invariant(format!(
                "booking for invite {} staged in unit of work for {}",
                booking.invite_id(),
                self.invite_id
            )));
        }
        if let Some(open) = self.bookings.iter().find(|b| b.is_open()) {
            return Err(DomainError::conflict(format!(
                "invite {} already has open booking {}",
                self.invite_id,
                open.id_typed()
            )));
        }

        self.dirty_bookings.insert(booking.id_typed());
        self.bookings.push(booking);
        Ok(())
    }

    fn update_booking(&mut self, booking: Booking) -> Result<(), DomainError> {
        let id = booking.id_typed();
        let slot = self
            .bookings
            .iter_mut()
            .find(|b| b.id_typed() == id)
            .ok_or_else(|| DomainError::not_found(format!("booking {id}")))?;

        *slot = booking;
        self.dirty_bookings.insert(id);
        Ok(())
    }
}

impl EscrowRecords for UnitOfWork {
    fn load_escrow(&mut self, invite_id: InviteId) -> Result<Option<EscrowRecord>, EscrowError> {
        Ok(self.escrow.clone().filter(|r| r.invite_id() == invite_id))
    }

    fn stage_escrow(&mut self, record: EscrowRecord) -> Result<(), EscrowError> {
        if record.invite_id() != self.invite_id {
            return Err(EscrowError::Storage(format!(
                "escrow for invite {} staged in unit of work for {}",
                record.invite_id(),
                self.invite_id
            )));
        }
        if let Some(existing) = &self.escrow {
            if existing.id_typed() != record.id_typed() {
                return Err(EscrowError::AlreadyHeld(self.invite_id));
            }
        }

        self.escrow = Some(record);
        self.escrow_dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use meetpay_booking::SlotPolicy;
    use meetpay_core::{Currency, EscrowId, UserId};
    use meetpay_escrow::ProcessorReference;
    use meetpay_invites::NewInvite;

    use super::*;

    fn test_invite() -> (Invite, EscrowRecord) {
        let now = Utc::now();
        let (invite, fingerprint) = Invite::open(
            InviteId::new(),
            NewInvite {
                creator_id: UserId::parse("creator").unwrap(),
                title: "Office hours".to_string(),
                description: None,
                amount: Decimal::new(50, 0),
                currency: None,
                duration_minutes: 15,
                available_slots: vec![],
                payment_fingerprint: "4242".to_string(),
            },
            &SlotPolicy::default(),
            &Currency::usd(),
            now,
        )
        .unwrap();
        let escrow = EscrowRecord::held(
            EscrowId::new(),
            invite.id_typed(),
            invite.money().clone(),
            ProcessorReference::new("pi_sim_test"),
            fingerprint,
            now,
        );
        (invite, escrow)
    }

    fn test_booking(invite_id: InviteId, invitee: &str) -> Booking {
        let now = Utc::now();
        Booking::scheduled(
            BookingId::new(),
            invite_id,
            UserId::parse(invitee).unwrap(),
            now + Duration::days(1),
            now,
        )
    }

    #[test]
    fn new_invite_expects_absent_and_stages_version_one() {
        let (invite, escrow) = test_invite();
        let mut uow = UnitOfWork::begin(invite.id_typed(), Snapshot::default());

        assert!(uow.require_details().is_err());
        uow.stage_escrow(escrow).unwrap();
        uow.stage_invite(invite.clone()).unwrap();
        assert_eq!(
            uow.require_details().unwrap().participants(),
            vec![invite.creator_id().clone()]
        );

        let changes = uow.into_changes();
        assert_eq!(changes.expected, ExpectedVersion::Absent);
        assert_eq!(changes.invite, Some(invite));
        assert!(changes.escrow.is_some());
        assert!(changes.bookings.is_empty());
    }

    #[test]
    fn stage_invite_rejects_skipped_or_stale_versions() {
        let (mut invite, escrow) = test_invite();
        let mut uow = UnitOfWork::begin(
            invite.id_typed(),
            Snapshot {
                invite: Some(invite.clone()),
                bookings: vec![],
                escrow: Some(escrow),
            },
        );

        // Unchanged version.
        assert!(matches!(
            uow.stage_invite(invite.clone()),
            Err(StoreError::InvalidChange(_))
        ));

        invite.reconcile(false, meetpay_escrow::EscrowStatus::Held, Utc::now());
        uow.stage_invite(invite).unwrap();
        assert_eq!(uow.into_changes().expected, ExpectedVersion::Exact(1));
    }

    #[test]
    fn second_open_booking_is_a_conflict() {
        let (invite, escrow) = test_invite();
        let invite_id = invite.id_typed();
        let mut uow = UnitOfWork::begin(
            invite_id,
            Snapshot {
                invite: Some(invite),
                bookings: vec![test_booking(invite_id, "a")],
                escrow: Some(escrow),
            },
        );

        let err = uow.insert_booking(test_booking(invite_id, "b")).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert!(uow.into_changes().is_empty());
    }

    #[test]
    fn change_set_only_carries_touched_records() {
        let (invite, escrow) = test_invite();
        let invite_id = invite.id_typed();
        let mut cancelled = test_booking(invite_id, "a");
        cancelled.cancel(Utc::now()).unwrap();

        let mut uow = UnitOfWork::begin(
            invite_id,
            Snapshot {
                invite: Some(invite),
                bookings: vec![cancelled],
                escrow: Some(escrow),
            },
        );
        let fresh = test_booking(invite_id, "b");
        uow.insert_booking(fresh.clone()).unwrap();

        let changes = uow.into_changes();
        assert_eq!(changes.bookings, vec![fresh]);
        assert!(changes.invite.is_none());
        assert!(changes.escrow.is_none());
    }

    #[test]
    fn latest_booking_prefers_the_open_one() {
        let invite_id = InviteId::new();
        let open = test_booking(invite_id, "b");
        let mut cancelled = test_booking(invite_id, "a");
        cancelled.cancel(Utc::now()).unwrap();

        let bookings = vec![cancelled.clone(), open.clone()];
        assert_eq!(latest_booking(&bookings), Some(&open));
        assert_eq!(latest_booking(&[cancelled.clone()]), Some(&cancelled));
        assert_eq!(latest_booking(&[]), None);
    }
}
