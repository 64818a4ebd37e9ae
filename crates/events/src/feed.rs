//! Change notification feed: lifecycle events routed by participant identity.
//!
//! The feed has no state machine of its own. It is fed exclusively by the
//! lifecycle manager, after commit, and hands each subscriber the events that
//! concern them. Events are invalidation hints: subscribers re-fetch the
//! invite they name instead of applying payloads incrementally, since no event
//! is a consistent snapshot across concurrent transitions.

use std::marker::PhantomData;
use std::sync::mpsc::{RecvError, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use meetpay_core::UserId;

use crate::bus::{EventBus, Subscription};
use crate::envelope::EventEnvelope;
use crate::in_memory_bus::InMemoryEventBus;

/// Messages that are addressed to a set of participants.
pub trait ParticipantScoped {
    fn concerns(&self, user: &UserId) -> bool;
}

impl<E> ParticipantScoped for EventEnvelope<E> {
    fn concerns(&self, user: &UserId) -> bool {
        self.participants().iter().any(|p| p == user)
    }
}

/// Publish side of the feed plus per-participant subscriptions.
#[derive(Debug)]
pub struct NotificationFeed<E, B = InMemoryEventBus<EventEnvelope<E>>> {
    bus: B,
    _event: PhantomData<fn() -> E>,
}

impl<E: Clone + Send + 'static> NotificationFeed<E> {
    /// Feed backed by an in-memory bus.
    pub fn in_memory() -> Self {
        Self::new(InMemoryEventBus::new())
    }
}

impl<E, B> NotificationFeed<E, B>
where
    E: Clone + Send + 'static,
    B: EventBus<EventEnvelope<E>>,
{
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            _event: PhantomData,
        }
    }

    /// Publish one committed event to every subscriber it concerns.
    pub fn publish(&self, envelope: EventEnvelope<E>) -> Result<(), B::Error> {
        tracing::debug!(
            invite_id = %envelope.invite_id(),
            event_type = envelope.event_type(),
            sequence = envelope.sequence_number(),
            "publishing lifecycle event"
        );
        self.bus.publish(envelope)
    }

    /// Subscribe to events concerning `user` (as creator or invitee).
    pub fn subscribe(&self, user: UserId) -> ParticipantSubscription<E> {
        ParticipantSubscription {
            user,
            inner: self.bus.subscribe(),
        }
    }

    /// Unfiltered subscription (operator dashboards, tests).
    pub fn subscribe_all(&self) -> Subscription<EventEnvelope<E>> {
        self.bus.subscribe()
    }
}

/// A subscription that only yields events concerning one participant.
#[derive(Debug)]
pub struct ParticipantSubscription<E> {
    user: UserId,
    inner: Subscription<EventEnvelope<E>>,
}

impl<E> ParticipantSubscription<E> {
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Block until the next event for this participant.
    pub fn recv(&self) -> Result<EventEnvelope<E>, RecvError> {
        loop {
            let envelope = self.inner.recv()?;
            if envelope.concerns(&self.user) {
                return Ok(envelope);
            }
        }
    }

    /// Next already-delivered event for this participant, if any.
    pub fn try_recv(&self) -> Result<EventEnvelope<E>, TryRecvError> {
        loop {
            let envelope = self.inner.try_recv()?;
            if envelope.concerns(&self.user) {
                return Ok(envelope);
            }
        }
    }

    /// Wait up to `timeout` for an event for this participant.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<EventEnvelope<E>, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let envelope = self.inner.recv_timeout(remaining)?;
            if envelope.concerns(&self.user) {
                return Ok(envelope);
            }
        }
    }

    /// Everything delivered so far, without blocking.
    pub fn drain(&self) -> Vec<EventEnvelope<E>> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.try_recv() {
            out.push(envelope);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use meetpay_core::InviteId;
    use uuid::Uuid;

    use super::*;
    use crate::Event;

    #[derive(Debug, Clone, PartialEq)]
    struct Touched {
        at: DateTime<Utc>,
    }

    impl Event for Touched {
        fn event_type(&self) -> &'static str {
            "test.touched"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn envelope(participants: &[&str]) -> EventEnvelope<Touched> {
        EventEnvelope::new(
            Uuid::now_v7(),
            InviteId::new(),
            participants.iter().map(|p| user(p)).collect(),
            1,
            Touched { at: Utc::now() },
        )
    }

    #[test]
    fn subscribers_only_see_events_they_participate_in() {
        let feed = NotificationFeed::in_memory();
        let creator = feed.subscribe(user("creator"));
        let stranger = feed.subscribe(user("stranger"));

        feed.publish(envelope(&["creator", "invitee"])).unwrap();

        let got = creator.try_recv().unwrap();
        assert_eq!(got.event_type(), "test.touched");
        assert!(stranger.try_recv().is_err());
    }

    #[test]
    fn drain_skips_foreign_events_and_keeps_order() {
        let feed = NotificationFeed::in_memory();
        let sub = feed.subscribe(user("u1"));

        let first = envelope(&["u1"]);
        let second = envelope(&["u1", "u2"]);
        feed.publish(first.clone()).unwrap();
        feed.publish(envelope(&["u2"])).unwrap();
        feed.publish(second.clone()).unwrap();

        let drained = sub.drain();
        assert_eq!(drained, vec![first, second]);
    }

    #[test]
    fn duplicate_participants_are_collapsed() {
        let env = envelope(&["u1", "u1"]);
        assert_eq!(env.participants().len(), 1);
    }

    #[test]
    fn recv_timeout_ignores_foreign_events_until_deadline() {
        let feed = NotificationFeed::in_memory();
        let sub = feed.subscribe(user("u1"));
        feed.publish(envelope(&["u2"])).unwrap();

        let res = sub.recv_timeout(Duration::from_millis(20));
        assert!(matches!(res, Err(RecvTimeoutError::Timeout)));
    }
}
