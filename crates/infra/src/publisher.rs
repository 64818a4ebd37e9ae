//! Post-commit publishing of lifecycle events.
//!
//! ```text
//! unit of work commits → outbox → NotificationFeed::publish → subscribers
//! ```
//!
//! Envelopes enter the outbox only after their unit of work committed. A
//! transport failure leaves them queued, in order, for the next `publish` or
//! an explicit `flush`; it never fails the operation that produced them.

use std::collections::VecDeque;

use parking_lot::Mutex;

use meetpay_events::{EventBus, EventEnvelope, InMemoryEventBus, NotificationFeed};
use meetpay_invites::InviteEvent;

pub type InviteEnvelope = EventEnvelope<InviteEvent>;

#[derive(Debug)]
pub struct FeedPublisher<B = InMemoryEventBus<InviteEnvelope>> {
    feed: NotificationFeed<InviteEvent, B>,
    outbox: Mutex<VecDeque<InviteEnvelope>>,
}

impl FeedPublisher {
    pub fn in_memory() -> Self {
        Self::new(NotificationFeed::in_memory())
    }
}

impl<B> FeedPublisher<B>
where
    B: EventBus<InviteEnvelope>,
{
    pub fn new(feed: NotificationFeed<InviteEvent, B>) -> Self {
        Self {
            feed,
            outbox: Mutex::new(VecDeque::new()),
        }
    }

    pub fn feed(&self) -> &NotificationFeed<InviteEvent, B> {
        &self.feed
    }

    /// Queue a committed envelope and try to deliver everything queued.
    pub fn publish(&self, envelope: InviteEnvelope) {
        self.outbox.lock().push_back(envelope);
        self.flush();
    }

    /// Deliver queued envelopes in commit order; returns how many went out.
    ///
    /// Stops at the first transport failure and keeps the rest queued.
    pub fn flush(&self) -> usize {
        let mut outbox = self.outbox.lock();
        let mut delivered = 0;

        while let Some(envelope) = outbox.pop_front() {
            let invite_id = envelope.invite_id();
            let sequence = envelope.sequence_number();
            if let Err(err) = self.feed.publish(envelope.clone()) {
                tracing::warn!(
                    invite_id = %invite_id,
                    sequence,
                    pending = outbox.len() + 1,
                    error = ?err,
                    "feed publish failed; keeping event queued"
                );
                outbox.push_front(envelope);
                break;
            }
            delivered += 1;
        }
        delivered
    }

    /// Envelopes committed but not yet delivered.
    pub fn pending(&self) -> usize {
        self.outbox.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Utc;
    use uuid::Uuid;

    use meetpay_core::{InviteId, UserId};
    use meetpay_events::Subscription;
    use meetpay_invites::InviteCancelled;

    use super::*;

    /// Bus whose transport can be switched off.
    #[derive(Default)]
    struct FlakyBus {
        inner: InMemoryEventBus<InviteEnvelope>,
        down: AtomicBool,
    }

    impl EventBus<InviteEnvelope> for FlakyBus {
        type Error = &'static str;

        fn publish(&self, message: InviteEnvelope) -> Result<(), Self::Error> {
            if self.down.load(Ordering::SeqCst) {
                return Err("transport down");
            }
            self.inner.publish(message).map_err(|_| "closed")
        }

        fn subscribe(&self) -> Subscription<InviteEnvelope> {
            self.inner.subscribe()
        }
    }

    fn envelope(sequence: u64) -> InviteEnvelope {
        let invite_id = InviteId::new();
        EventEnvelope::new(
            Uuid::now_v7(),
            invite_id,
            vec![UserId::parse("creator").unwrap()],
            sequence,
            InviteEvent::Cancelled(InviteCancelled {
                invite_id,
                booking_id: None,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn failed_publish_stays_queued_until_flush() {
        let bus = Arc::new(FlakyBus::default());
        let publisher = FeedPublisher::new(NotificationFeed::new(bus.clone()));
        let sub = publisher.feed().subscribe(UserId::parse("creator").unwrap());

        bus.down.store(true, Ordering::SeqCst);
        publisher.publish(envelope(1));
        publisher.publish(envelope(2));
        assert_eq!(publisher.pending(), 2);
        assert!(sub.try_recv().is_err());

        bus.down.store(false, Ordering::SeqCst);
        assert_eq!(publisher.flush(), 2);
        assert_eq!(publisher.pending(), 0);

        let received: Vec<u64> = sub.drain().iter().map(|e| e.sequence_number()).collect();
        assert_eq!(received, vec![1, 2]);
    }

    #[test]
    fn closed_bus_keeps_events_queued() {
        let bus = Arc::new(InMemoryEventBus::new());
        let publisher = FeedPublisher::new(NotificationFeed::new(bus.clone()));

        bus.close();
        publisher.publish(envelope(1));
        assert_eq!(publisher.flush(), 0);
        assert_eq!(publisher.pending(), 1);
    }
}
