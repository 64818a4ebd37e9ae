//! Invite lifecycle orchestration.
//!
//! ```text
//! operation
//!   ↓
//! 1. Open a unit of work scoped to the invite (bounded wait)
//!   ↓
//! 2. Check guards against the composite (invite, booking, escrow record)
//!   ↓
//! 3. Delegate to the booking scheduler and the escrow ledger (staged writes)
//!   ↓
//! 4. Re-derive the invite status, check the change set (version compare-and-set)
//!   ↓
//! 5. Settle staged escrow at the processor, then apply
//!   ↓
//! 6. Publish exactly one lifecycle event to the feed
//! ```
//!
//! A failure in steps 1–5 leaves nothing behind: the unit of work is dropped
//! and the invite keeps its prior status. Step 6 never fails the operation.
//! The processor hold placed by `create_invite` is the one effect taken
//! before the checks; it is released again when the commit fails.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use meetpay_booking::{Booking, BookingScheduler, BookingTarget};
use meetpay_core::{AggregateRoot, InviteId, UserId};
use meetpay_escrow::{EscrowLedger, EscrowRecord, PaymentProcessor, SimulatedProcessor};
use meetpay_events::{EventBus, EventEnvelope, InMemoryEventBus, ParticipantSubscription};
use meetpay_invites::{Invite, InviteDetails, InviteEvent, InviteStatus, NewInvite};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::projections::dashboard::DashboardSummary;
use crate::publisher::{FeedPublisher, InviteEnvelope};
use crate::store::{ChangeSet, InMemoryStore, Store, UnitOfWork};

/// What a unit of work decided.
enum Transition<T> {
    /// State changed; publish the event once committed.
    Applied {
        value: T,
        event: InviteEvent,
        participants: Vec<UserId>,
    },
    /// Already in the requested state; nothing was written.
    Unchanged(T),
}

/// Entry point for every invite lifecycle operation.
#[derive(Debug)]
pub struct LifecycleManager<
    S = InMemoryStore,
    P = SimulatedProcessor,
    B = InMemoryEventBus<InviteEnvelope>,
> {
    store: S,
    ledger: EscrowLedger<P>,
    scheduler: BookingScheduler,
    publisher: FeedPublisher<B>,
    config: EngineConfig,
}

impl LifecycleManager {
    /// Fully in-memory engine (in-memory store and feed, simulated processor).
    pub fn in_memory(config: EngineConfig) -> Self {
        let store = InMemoryStore::new(config.lock_wait());
        let processor = SimulatedProcessor::new(config.decline_fingerprints.clone());
        Self::new(config, store, processor, FeedPublisher::in_memory())
    }
}

impl<S, P, B> LifecycleManager<S, P, B>
where
    S: Store,
    P: PaymentProcessor,
    B: EventBus<InviteEnvelope>,
{
    pub fn new(config: EngineConfig, store: S, processor: P, publisher: FeedPublisher<B>) -> Self {
        Self {
            store,
            ledger: EscrowLedger::new(processor),
            scheduler: BookingScheduler::new(config.slot_policy()),
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn processor(&self) -> &P {
        self.ledger.processor()
    }

    pub fn publisher(&self) -> &FeedPublisher<B> {
        &self.publisher
    }

    /// Create an invite and hold its funds; both commit or neither does.
    #[tracing::instrument(skip(self, request), fields(creator_id = %request.creator_id))]
    pub fn create_invite(&self, request: NewInvite) -> Result<Invite, EngineError> {
        let now = Utc::now();
        let invite_id = InviteId::new();
        let (invite, fingerprint) = Invite::open(
            invite_id,
            request,
            self.scheduler.policy(),
            &self.config.default_currency,
            now,
        )?;

        let mut authorized: Option<EscrowRecord> = None;
        let result = self.store.transact(invite_id, |uow| -> Result<_, EngineError> {
            let record = self
                .ledger
                .hold(uow, invite_id, invite.money().clone(), fingerprint, now)?;
            authorized = Some(record);
            uow.stage_invite(invite.clone())?;
            Ok(uow.require_details()?.participants())
        });

        let participants = match result {
            Ok(participants) => participants,
            Err(err) => {
                if let Some(record) = authorized {
                    self.compensate_hold(&record, &err);
                }
                return Err(err);
            }
        };

        tracing::info!(invite_id = %invite_id, amount = %invite.money(), "invite created");
        self.emit(&invite, InviteEvent::created(&invite), participants);
        Ok(invite)
    }

    /// Claim `scheduled_at` on an active invite.
    ///
    /// Exactly one of any number of concurrent callers wins; the others get
    /// `EngineError::Conflict` and leave no trace.
    #[tracing::instrument(skip(self), fields(invitee_id = %invitee_id))]
    pub fn book(
        &self,
        invite_id: InviteId,
        invitee_id: &UserId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        let now = Utc::now();
        let (booking, invite, participants) = self.store.transact(invite_id, |uow| -> Result<_, EngineError> {
            let mut invite = uow.require_invite()?;
            let target = BookingTarget {
                invite_id,
                creator_id: invite.creator_id(),
                accepting: invite.status() == InviteStatus::Active,
                slots: invite.available_time_slots(),
            };
            let booking = self
                .scheduler
                .book(uow, target, invitee_id, scheduled_at, now)?;

            let escrow = uow.require_escrow()?;
            invite.reconcile(true, escrow.status(), now);
            uow.stage_invite(invite.clone())?;
            let participants = uow.require_details()?.participants();
            Ok((booking, invite, participants))
        })?;

        tracing::info!(
            invite_id = %invite_id,
            booking_id = %booking.id_typed(),
            scheduled_at = %booking.scheduled_at(),
            "invite booked"
        );
        self.emit(&invite, InviteEvent::booked(&booking), participants);
        Ok(booking)
    }

    /// Confirm the meeting took place: complete the booking and capture the
    /// escrowed funds. Confirming a completed invite again is a no-op.
    #[tracing::instrument(skip(self), fields(caller_id = %caller_id))]
    pub fn confirm(&self, invite_id: InviteId, caller_id: &UserId) -> Result<Invite, EngineError> {
        let now = Utc::now();
        let work = |uow: &mut UnitOfWork| -> Result<_, EngineError> {
            let mut invite = uow.require_invite()?;
            invite.ensure_creator(caller_id, "confirm")?;

            match invite.status() {
                InviteStatus::Completed => return Ok(Transition::Unchanged(invite)),
                InviteStatus::Active => {
                    return Err(EngineError::invalid_transition(format!(
                        "invite {invite_id} has not been booked"
                    )));
                }
                InviteStatus::Cancelled => {
                    return Err(EngineError::invalid_transition(format!(
                        "invite {invite_id} is cancelled"
                    )));
                }
                InviteStatus::Booked => {}
            }

            let booking = self.scheduler.complete(uow, invite_id, now)?;
            let escrow = self.ledger.capture(uow, invite_id, now)?;

            invite.confirm_meeting();
            invite.reconcile(true, escrow.record().status(), now);
            uow.stage_invite(invite.clone())?;

            Ok(Transition::Applied {
                event: InviteEvent::confirmed(&booking),
                participants: uow.require_details()?.participants(),
                value: invite,
            })
        };
        let transition =
            self.store
                .transact_with(invite_id, work, |changes| self.settle_at_processor(changes))?;

        Ok(self.finish(transition, "meeting confirmed"))
    }

    /// Cancel the invite: cancel any open booking and void the escrowed
    /// funds. Cancelling a cancelled invite again is a no-op.
    #[tracing::instrument(skip(self), fields(caller_id = %caller_id))]
    pub fn cancel(&self, invite_id: InviteId, caller_id: &UserId) -> Result<Invite, EngineError> {
        let now = Utc::now();
        let work = |uow: &mut UnitOfWork| -> Result<_, EngineError> {
            let mut invite = uow.require_invite()?;
            invite.ensure_creator(caller_id, "cancel")?;

            match invite.status() {
                InviteStatus::Cancelled => return Ok(Transition::Unchanged(invite)),
                InviteStatus::Completed => {
                    return Err(EngineError::invalid_transition(format!(
                        "invite {invite_id} is already completed"
                    )));
                }
                InviteStatus::Active | InviteStatus::Booked => {}
            }

            let booking = self.scheduler.cancel(uow, invite_id, now)?;
            let escrow = self.ledger.void(uow, invite_id, now)?;

            invite.reconcile(false, escrow.record().status(), now);
            uow.stage_invite(invite.clone())?;

            Ok(Transition::Applied {
                event: InviteEvent::cancelled(&invite, booking.as_ref()),
                participants: uow.require_details()?.participants(),
                value: invite,
            })
        };
        let transition =
            self.store
                .transact_with(invite_id, work, |changes| self.settle_at_processor(changes))?;

        Ok(self.finish(transition, "invite cancelled"))
    }

    pub fn get_invite(&self, invite_id: InviteId) -> Result<InviteDetails, EngineError> {
        self.store
            .load_details(invite_id)?
            .ok_or_else(|| EngineError::NotFound(format!("invite {invite_id}")))
    }

    /// Invites `user_id` created, newest first.
    pub fn list_invites_for_user(&self, user_id: &UserId) -> Result<Vec<Invite>, EngineError> {
        Ok(self.store.invites_by_creator(user_id)?)
    }

    /// Bookings `user_id` made, newest first.
    pub fn list_bookings_for_user(&self, user_id: &UserId) -> Result<Vec<Booking>, EngineError> {
        Ok(self.store.bookings_by_invitee(user_id)?)
    }

    /// Lifecycle events concerning `user_id`, from now on.
    pub fn subscribe(&self, user_id: UserId) -> ParticipantSubscription<InviteEvent> {
        self.publisher.feed().subscribe(user_id)
    }

    pub fn dashboard_for_user(&self, user_id: &UserId) -> Result<DashboardSummary, EngineError> {
        let now = Utc::now();

        let created = self
            .list_invites_for_user(user_id)?
            .into_iter()
            .map(|invite| self.get_invite(invite.id_typed()))
            .collect::<Result<Vec<_>, _>>()?;

        let bookings = self.list_bookings_for_user(user_id)?;
        let booked_on = bookings
            .iter()
            .map(|booking| self.get_invite(booking.invite_id()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DashboardSummary::build(
            &created,
            bookings.iter().zip(booked_on.iter()),
            now,
        ))
    }

    fn finish(&self, transition: Transition<Invite>, message: &'static str) -> Invite {
        match transition {
            Transition::Applied {
                value,
                event,
                participants,
            } => {
                tracing::info!(
                    invite_id = %value.id_typed(),
                    status = ?value.status(),
                    version = value.version(),
                    "{message}"
                );
                self.emit(&value, event, participants);
                value
            }
            Transition::Unchanged(value) => {
                tracing::debug!(
                    invite_id = %value.id_typed(),
                    status = ?value.status(),
                    "already in requested state; no-op"
                );
                value
            }
        }
    }

    fn emit(&self, invite: &Invite, event: InviteEvent, participants: Vec<UserId>) {
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            invite.id_typed(),
            participants,
            invite.version(),
            event,
        );
        self.publisher.publish(envelope);
    }

    /// Runs once the change set has passed every store check; a processor
    /// failure here aborts the commit with nothing applied.
    fn settle_at_processor(&self, changes: &ChangeSet) -> Result<(), EngineError> {
        if let Some(record) = &changes.escrow {
            self.ledger.finalize(record)?;
        }
        Ok(())
    }

    fn compensate_hold(&self, record: &EscrowRecord, cause: &EngineError) {
        match self.ledger.release_authorization(record) {
            Ok(()) => tracing::warn!(
                invite_id = %record.invite_id(),
                reference = %record.external_reference(),
                cause = %cause,
                "invite not created; released escrow authorization"
            ),
            Err(err) => tracing::warn!(
                invite_id = %record.invite_id(),
                reference = %record.external_reference(),
                cause = %cause,
                error = %err,
                "invite not created and escrow authorization release failed"
            ),
        }
    }
}
