//! Booking scheduler: claims an invite's time slot with at-most-one-winner
//! semantics.
//!
//! Business rules only; the record store behind `BookingRecords` provides the
//! conditional write that makes the guarantee hold under concurrency.

pub mod booking;
pub mod scheduler;
pub mod slots;

pub use booking::{Booking, BookingStatus};
pub use scheduler::{BookingRecords, BookingScheduler, BookingTarget};
pub use slots::SlotPolicy;
