use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use meetpay_booking::Booking;
use meetpay_core::{AggregateRoot, BookingId, Entity, InviteId, UserId};
use meetpay_escrow::EscrowRecord;
use meetpay_invites::{Invite, InviteDetails};

use super::r#trait::{Store, StoreError};
use super::unit_of_work::{ChangeSet, Snapshot, UnitOfWork, latest_booking};

fn owned_by<R>(invite_id: InviteId, record: &R, kind: &str) -> Result<(), StoreError>
where
    R: Entity<Owner = InviteId>,
    R::Id: std::fmt::Display,
{
    if *record.owner() == invite_id {
        return Ok(());
    }
    Err(StoreError::InvalidChange(format!(
        "{kind} {} belongs to invite {}, not {invite_id}",
        record.id(),
        record.owner()
    )))
}

#[derive(Debug, Default)]
struct Tables {
    invites: HashMap<InviteId, Invite>,
    bookings: HashMap<BookingId, Booking>,
    escrows: HashMap<InviteId, EscrowRecord>,
    bookings_by_invite: HashMap<InviteId, Vec<BookingId>>,
    invites_by_creator: HashMap<UserId, Vec<InviteId>>,
    bookings_by_invitee: HashMap<UserId, Vec<BookingId>>,
}

impl Tables {
    fn bookings_of(&self, invite_id: InviteId) -> Vec<Booking> {
        self.bookings_by_invite
            .get(&invite_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.bookings.get(id).cloned())
            .collect()
    }

    fn snapshot(&self, invite_id: InviteId) -> Snapshot {
        Snapshot {
            invite: self.invites.get(&invite_id).cloned(),
            bookings: self.bookings_of(invite_id),
            escrow: self.escrows.get(&invite_id).cloned(),
        }
    }

    /// Check the record constraints against the state `changes` would produce.
    fn check(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        let invite_id = changes.invite_id;
        for booking in &changes.bookings {
            owned_by(invite_id, booking, "booking")?;
        }
        if let Some(escrow) = &changes.escrow {
            owned_by(invite_id, escrow, "escrow record")?;
        }

        let mut bookings = self.bookings_of(invite_id);
        for staged in &changes.bookings {
            match bookings.iter_mut().find(|b| b.id_typed() == staged.id_typed()) {
                Some(existing) => *existing = staged.clone(),
                None => bookings.push(staged.clone()),
            }
        }
        if bookings.iter().filter(|b| b.is_open()).count() > 1 {
            return Err(StoreError::Constraint(format!(
                "invite {invite_id} would have more than one open booking"
            )));
        }

        if let (Some(staged), Some(existing)) = (&changes.escrow, self.escrows.get(&invite_id)) {
            if staged.id_typed() != existing.id_typed() {
                return Err(StoreError::Constraint(format!(
                    "invite {invite_id} already has escrow record {}",
                    existing.id_typed()
                )));
            }
        }

        let invite = changes.invite.as_ref().or_else(|| self.invites.get(&invite_id));
        let escrow = changes.escrow.as_ref().or_else(|| self.escrows.get(&invite_id));
        match (invite, escrow) {
            (Some(invite), Some(escrow)) => InviteDetails {
                invite: invite.clone(),
                booking: latest_booking(&bookings).cloned(),
                escrow: escrow.clone(),
            }
            .check_consistency()
            .map_err(|e| StoreError::InvalidChange(e.to_string())),
            (Some(_), None) => Err(StoreError::Constraint(format!(
                "invite {invite_id} has no escrow record"
            ))),
            (None, _) if !changes.is_empty() => Err(StoreError::InvalidChange(format!(
                "records staged for unknown invite {invite_id}"
            ))),
            (None, _) => Ok(()),
        }
    }

    fn apply(&mut self, changes: ChangeSet) {
        let invite_id = changes.invite_id;

        if let Some(invite) = changes.invite {
            if !self.invites.contains_key(&invite_id) {
                self.invites_by_creator
                    .entry(invite.creator_id().clone())
                    .or_default()
                    .push(invite_id);
            }
            self.invites.insert(invite_id, invite);
        }

        for booking in changes.bookings {
            let id = booking.id_typed();
            if !self.bookings.contains_key(&id) {
                self.bookings_by_invite.entry(invite_id).or_default().push(id);
                self.bookings_by_invitee
                    .entry(booking.invitee_id().clone())
                    .or_default()
                    .push(id);
            }
            self.bookings.insert(id, booking);
        }

        if let Some(escrow) = changes.escrow {
            self.escrows.insert(invite_id, escrow);
        }
    }
}

/// In-memory store.
///
/// Intended for tests/dev. Units of work on the same invite are serialized
/// by a per-invite guard; units of work on different invites only contend on
/// the short commit.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    guards: parking_lot::Mutex<HashMap<InviteId, Arc<parking_lot::Mutex<()>>>>,
    lock_wait: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl InMemoryStore {
    pub fn new(lock_wait: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            guards: parking_lot::Mutex::new(HashMap::new()),
            lock_wait,
        }
    }

    /// Apply a change set if the invite is still at the version it was read
    /// at and every record constraint still holds.
    pub fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        self.commit_with(changes, |_| Ok(()))
    }

    /// `commit`, running `before_apply` between the checks and the apply.
    /// The write lock is held throughout, so no other commit can slip in
    /// between the checks and the apply.
    pub fn commit_with<E, H>(&self, changes: ChangeSet, before_apply: H) -> Result<(), E>
    where
        H: FnOnce(&ChangeSet) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let invite_id = changes.invite_id;
        let current = tables.invites.get(&invite_id).map(AggregateRoot::version);
        if !changes.expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "invite {invite_id}: expected {:?}, found {current:?}",
                changes.expected
            ))
            .into());
        }

        tables.check(&changes)?;
        before_apply(&changes)?;
        tables.apply(changes);
        Ok(())
    }

    /// Number of invites currently holding a guard (in-flight units of work).
    pub fn active_guards(&self) -> usize {
        self.guards.lock().len()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn guard_for(&self, invite_id: InviteId) -> Arc<parking_lot::Mutex<()>> {
        self.guards.lock().entry(invite_id).or_default().clone()
    }

    fn release_guard(&self, invite_id: InviteId, guard: Arc<parking_lot::Mutex<()>>) {
        let mut guards = self.guards.lock();
        // Only the map and this caller still reference it: nobody is waiting.
        if Arc::strong_count(&guard) == 2 {
            guards.remove(&invite_id);
        }
    }

    fn run<T, E, F, H>(
        &self,
        invite_id: InviteId,
        guard: &parking_lot::Mutex<()>,
        work: F,
        before_apply: H,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, E>,
        H: FnOnce(&ChangeSet) -> Result<(), E>,
        E: From<StoreError>,
    {
        let Some(_held) = guard.try_lock_for(self.lock_wait) else {
            tracing::warn!(
                invite_id = %invite_id,
                lock_wait = ?self.lock_wait,
                "timed out waiting for invite"
            );
            return Err(StoreError::Busy(invite_id).into());
        };

        let snapshot = self.read()?.snapshot(invite_id);
        let mut uow = UnitOfWork::begin(invite_id, snapshot);
        let value = work(&mut uow)?;

        let changes = uow.into_changes();
        if !changes.is_empty() {
            self.commit_with(changes, before_apply)?;
        }
        Ok(value)
    }
}

impl Store for InMemoryStore {
    fn transact_with<T, E, F, H>(&self, invite_id: InviteId, work: F, before_apply: H) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, E>,
        H: FnOnce(&ChangeSet) -> Result<(), E>,
        E: From<StoreError>,
    {
        let guard = self.guard_for(invite_id);
        let result = self.run(invite_id, &guard, work, before_apply);
        self.release_guard(invite_id, guard);
        result
    }

    fn load_details(&self, invite_id: InviteId) -> Result<Option<InviteDetails>, StoreError> {
        let tables = self.read()?;
        let Some(invite) = tables.invites.get(&invite_id) else {
            return Ok(None);
        };
        let escrow = tables.escrows.get(&invite_id).ok_or_else(|| {
            StoreError::Constraint(format!("invite {invite_id} has no escrow record"))
        })?;
        let bookings = tables.bookings_of(invite_id);

        Ok(Some(InviteDetails {
            invite: invite.clone(),
            booking: latest_booking(&bookings).cloned(),
            escrow: escrow.clone(),
        }))
    }

    fn invites_by_creator(&self, user: &UserId) -> Result<Vec<Invite>, StoreError> {
        let tables = self.read()?;
        let mut invites: Vec<Invite> = tables
            .invites_by_creator
            .get(user)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.invites.get(id).cloned())
            .collect();
        invites.sort_by(|a, b| {
            (b.created_at(), b.id_typed()).cmp(&(a.created_at(), a.id_typed()))
        });
        Ok(invites)
    }

    fn bookings_by_invitee(&self, user: &UserId) -> Result<Vec<Booking>, StoreError> {
        let tables = self.read()?;
        let mut bookings: Vec<Booking> = tables
            .bookings_by_invitee
            .get(user)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.bookings.get(id).cloned())
            .collect();
        bookings.sort_by(|a, b| {
            (b.created_at(), b.id_typed()).cmp(&(a.created_at(), a.id_typed()))
        });
        Ok(bookings)
    }
}
