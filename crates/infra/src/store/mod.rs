//! Record storage for the invite composite (invite, bookings, escrow record).
//!
//! Every write goes through a [`UnitOfWork`] scoped to one invite. The backend
//! serializes units of work per invite and re-checks the invite version and
//! the record constraints when it commits the staged [`ChangeSet`].

pub mod in_memory;
pub mod r#trait;
pub mod unit_of_work;

pub use in_memory::InMemoryStore;
pub use r#trait::{Store, StoreError};
pub use unit_of_work::{ChangeSet, UnitOfWork};
