//! Subscriber-side read-through cache of invite details.
//!
//! The cache loads on miss and drops entries when the feed reports a newer
//! version of the invite. Feed events are only hints: the cache never applies
//! them, it re-fetches. Entries only stay fresh for invites the subscribed
//! user takes part in; use [`InviteCache::refresh`] for anything else.

use std::collections::HashMap;
use std::sync::Arc;

use meetpay_core::{AggregateRoot, InviteId, UserId};
use meetpay_escrow::PaymentProcessor;
use meetpay_events::{EventBus, ParticipantSubscription};
use meetpay_invites::{InviteDetails, InviteEvent};

use crate::error::EngineError;
use crate::lifecycle::LifecycleManager;
use crate::publisher::InviteEnvelope;
use crate::store::Store;

/// Where the cache loads invite details from.
pub trait InviteSource {
    fn load_invite(&self, invite_id: InviteId) -> Result<InviteDetails, EngineError>;
}

impl<S, P, B> InviteSource for LifecycleManager<S, P, B>
where
    S: Store,
    P: PaymentProcessor,
    B: EventBus<InviteEnvelope>,
{
    fn load_invite(&self, invite_id: InviteId) -> Result<InviteDetails, EngineError> {
        self.get_invite(invite_id)
    }
}

impl<T> InviteSource for Arc<T>
where
    T: InviteSource + ?Sized,
{
    fn load_invite(&self, invite_id: InviteId) -> Result<InviteDetails, EngineError> {
        (**self).load_invite(invite_id)
    }
}

impl<T> InviteSource for &T
where
    T: InviteSource + ?Sized,
{
    fn load_invite(&self, invite_id: InviteId) -> Result<InviteDetails, EngineError> {
        (**self).load_invite(invite_id)
    }
}

#[derive(Debug)]
pub struct InviteCache<Src> {
    source: Src,
    subscription: ParticipantSubscription<InviteEvent>,
    entries: HashMap<InviteId, InviteDetails>,
}

impl<Src: InviteSource> InviteCache<Src> {
    pub fn new(source: Src, subscription: ParticipantSubscription<InviteEvent>) -> Self {
        Self {
            source,
            subscription,
            entries: HashMap::new(),
        }
    }

    pub fn user(&self) -> &UserId {
        self.subscription.user()
    }

    /// Cached details, loading them on miss or after an invalidation.
    pub fn get(&mut self, invite_id: InviteId) -> Result<InviteDetails, EngineError> {
        self.sync();
        if let Some(details) = self.entries.get(&invite_id) {
            return Ok(details.clone());
        }
        self.refresh(invite_id)
    }

    /// Load from the source unconditionally and replace the entry.
    pub fn refresh(&mut self, invite_id: InviteId) -> Result<InviteDetails, EngineError> {
        let details = self.source.load_invite(invite_id)?;
        self.entries.insert(invite_id, details.clone());
        Ok(details)
    }

    /// Apply pending feed events; returns how many entries were dropped.
    pub fn sync(&mut self) -> usize {
        let mut dropped = 0;
        for envelope in self.subscription.drain() {
            let invite_id = envelope.invite_id();
            let stale = self
                .entries
                .get(&invite_id)
                .is_some_and(|d| d.invite.version() < envelope.sequence_number());
            if stale {
                self.entries.remove(&invite_id);
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(user = %self.user(), dropped, "invalidated cached invites");
        }
        dropped
    }

    pub fn invalidate(&mut self, invite_id: InviteId) -> bool {
        self.entries.remove(&invite_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
