//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Bookings and escrow records are entities owned by an invite: they have
/// their own identity but are only ever written together with their owner.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Identifier of the aggregate that owns this entity.
    type Owner: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Returns the owning aggregate's identifier.
    fn owner(&self) -> &Self::Owner;
}
