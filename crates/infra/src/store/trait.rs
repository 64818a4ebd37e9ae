use std::sync::Arc;

use thiserror::Error;

use meetpay_booking::Booking;
use meetpay_core::{InviteId, UserId};
use meetpay_invites::{Invite, InviteDetails};

use super::unit_of_work::{ChangeSet, UnitOfWork};

/// Store operation error.
///
/// These are infrastructure errors (contention, constraints, backend health)
/// as opposed to domain errors (validation, authorization).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Compare-and-set on the invite version failed at commit.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A record constraint (one open booking, one escrow record) would break.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Another operation held the invite for longer than the configured wait.
    #[error("invite {0} is busy")]
    Busy(InviteId),

    /// Staged records are malformed (wrong invite, skipped version).
    #[error("invalid change set: {0}")]
    InvalidChange(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Storage for invite composites.
///
/// ## Write semantics
///
/// `transact()`:
/// - waits (bounded) for exclusive use of the invite, else `StoreError::Busy`
/// - hands `work` a unit of work over the invite's committed records
/// - if `work` succeeds, commits its change set atomically, re-checking the
///   invite version and record constraints; if `work` fails, nothing is written
///
/// `transact_with()` additionally runs `before_apply` on a non-empty change
/// set once it has passed every commit check. An error from `before_apply`
/// aborts the commit; nothing may fail after it has succeeded. Side effects
/// outside the store (processor settlement) belong there.
///
/// No intermediate state of a unit of work is ever visible to readers.
pub trait Store: Send + Sync {
    fn transact_with<T, E, F, H>(&self, invite_id: InviteId, work: F, before_apply: H) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, E>,
        H: FnOnce(&ChangeSet) -> Result<(), E>,
        E: From<StoreError>;

    fn transact<T, E, F>(&self, invite_id: InviteId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.transact_with(invite_id, work, |_| Ok(()))
    }

    /// The invite with its latest booking and its escrow record.
    fn load_details(&self, invite_id: InviteId) -> Result<Option<InviteDetails>, StoreError>;

    /// Invites created by `user`, newest first.
    fn invites_by_creator(&self, user: &UserId) -> Result<Vec<Invite>, StoreError>;

    /// Bookings made by `user`, newest first.
    fn bookings_by_invitee(&self, user: &UserId) -> Result<Vec<Booking>, StoreError>;
}

impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    fn transact_with<T, E, F, H>(&self, invite_id: InviteId, work: F, before_apply: H) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, E>,
        H: FnOnce(&ChangeSet) -> Result<(), E>,
        E: From<StoreError>,
    {
        (**self).transact_with(invite_id, work, before_apply)
    }

    fn load_details(&self, invite_id: InviteId) -> Result<Option<InviteDetails>, StoreError> {
        (**self).load_details(invite_id)
    }

    fn invites_by_creator(&self, user: &UserId) -> Result<Vec<Invite>, StoreError> {
        (**self).invites_by_creator(user)
    }

    fn bookings_by_invitee(&self, user: &UserId) -> Result<Vec<Booking>, StoreError> {
        (**self).bookings_by_invitee(user)
    }
}
