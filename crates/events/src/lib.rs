//! Lifecycle events and the change notification feed.
//!
//! This crate holds the mechanics only: the `Event` trait, the envelope that
//! travels over the bus, the bus abstraction with an in-memory implementation,
//! and the participant-filtered feed built on top of it.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod feed;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use feed::{NotificationFeed, ParticipantScoped, ParticipantSubscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
