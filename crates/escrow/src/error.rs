use thiserror::Error;

use meetpay_core::InviteId;

use crate::record::EscrowStatus;

/// Escrow operation error.
///
/// Any of these aborts the lifecycle transition that triggered it; the invite
/// keeps its prior status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// The operation is not valid from the record's current status
    /// (capture of a voided hold, void of a captured hold).
    #[error("cannot {operation} escrow in status {status:?}")]
    InvalidState {
        operation: &'static str,
        status: EscrowStatus,
    },

    /// A hold was requested for an invite that already has one.
    #[error("invite {0} already has an escrow record")]
    AlreadyHeld(InviteId),

    /// No escrow record exists for the invite.
    #[error("no escrow record for invite {0}")]
    NotFound(InviteId),

    /// The processor refused to place the hold.
    #[error("hold declined: {0}")]
    Declined(String),

    /// The processor could not complete the request.
    #[error("payment processor failure: {0}")]
    Processor(String),

    /// Reading or staging the record failed.
    #[error("escrow storage failure: {0}")]
    Storage(String),
}
