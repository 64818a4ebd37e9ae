//! Process-local broadcast bus backing the notification feed.

use std::sync::mpsc::{self, Sender};

use parking_lot::Mutex;
use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// The bus was shut down; the message was not delivered to anyone.
    #[error("event bus is closed")]
    Closed,
}

#[derive(Debug)]
struct Channels<M> {
    senders: Vec<Sender<M>>,
    closed: bool,
    published: u64,
}

/// In-memory broadcast bus.
///
/// Every live subscription gets a clone of each message published after it
/// subscribed. Subscriptions whose receiving side was dropped are pruned on
/// the next publish. After [`InMemoryEventBus::close`] publishing fails and
/// every subscription drains what it already has, then reports disconnection.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    channels: Mutex<Channels<M>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.channels.lock().senders.len()
    }

    /// Messages accepted since the bus was created.
    pub fn published(&self) -> u64 {
        self.channels.lock().published
    }

    /// Stop accepting messages and disconnect every subscription.
    pub fn close(&self) {
        let mut channels = self.channels.lock();
        channels.closed = true;
        channels.senders.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.channels.lock().closed
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            channels: Mutex::new(Channels {
                senders: Vec::new(),
                closed: false,
                published: 0,
            }),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut channels = self.channels.lock();
        if channels.closed {
            return Err(InMemoryBusError::Closed);
        }

        let before = channels.senders.len();
        channels.senders.retain(|tx| tx.send(message.clone()).is_ok());
        let dropped = before - channels.senders.len();
        if dropped > 0 {
            tracing::debug!(dropped, "pruned closed subscriptions");
        }
        channels.published += 1;
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        let mut channels = self.channels.lock();
        // On a closed bus `tx` is dropped here and the subscription starts out
        // disconnected.
        if !channels.closed {
            channels.senders.push(tx);
        }
        Subscription::new(rx)
    }
}
