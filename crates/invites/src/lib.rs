//! Invites domain module.
//!
//! The invite is the aggregate root of the composite (invite, booking, escrow
//! record). Its status is never set directly: it is derived from the other two
//! records every time the composite changes.

pub mod event;
pub mod invite;
pub mod projection;

pub use event::{InviteBooked, InviteCancelled, InviteCreated, InviteEvent, MeetingConfirmed};
pub use invite::{Invite, InviteStatus, NewInvite};
pub use projection::{InviteDetails, Phase};
