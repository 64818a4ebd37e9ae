use chrono::{DateTime, Utc};

/// A committed lifecycle fact.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - emitted only **after** the unit of work that produced them committed
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "invite.booked").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the transition was committed.
    fn occurred_at(&self) -> DateTime<Utc>;
}
