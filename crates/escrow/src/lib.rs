//! Escrow ledger: holds, captures and voids payment records.
//!
//! The ledger knows invites only as the key its records hang off. It proxies a
//! `PaymentProcessor` (simulated here) and guarantees that capture and void are
//! idempotent and mutually exclusive. Capture and void only stage the record;
//! `EscrowLedger::finalize` settles at the processor once the record is sure
//! to commit.

pub mod error;
pub mod ledger;
pub mod processor;
pub mod record;

pub use error::EscrowError;
pub use ledger::{EscrowLedger, EscrowRecords, LedgerOutcome};
pub use processor::{HoldRequest, PaymentProcessor, SimulatedProcessor};
pub use record::{EscrowRecord, EscrowStatus, PaymentFingerprint, ProcessorReference};
