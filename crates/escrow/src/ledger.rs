use chrono::{DateTime, Utc};

use meetpay_core::{EscrowId, InviteId, Money};

use crate::error::EscrowError;
use crate::processor::{HoldRequest, PaymentProcessor};
use crate::record::{EscrowRecord, EscrowStatus, PaymentFingerprint};

/// Record access the ledger needs, provided by the caller's unit of work.
///
/// Staged records become visible only when the surrounding unit of work
/// commits, so a failed transition never leaves a half-settled record behind.
pub trait EscrowRecords {
    fn load_escrow(&mut self, invite_id: InviteId) -> Result<Option<EscrowRecord>, EscrowError>;

    fn stage_escrow(&mut self, record: EscrowRecord) -> Result<(), EscrowError>;
}

/// Result of a capture/void request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The record moved to the requested status.
    Applied(EscrowRecord),
    /// The record was already in the requested status; nothing happened.
    Unchanged(EscrowRecord),
}

impl LedgerOutcome {
    pub fn record(&self) -> &EscrowRecord {
        match self {
            LedgerOutcome::Applied(r) | LedgerOutcome::Unchanged(r) => r,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, LedgerOutcome::Applied(_))
    }
}

/// Escrow ledger over a payment processor.
#[derive(Debug)]
pub struct EscrowLedger<P> {
    processor: P,
}

impl<P> EscrowLedger<P> {
    pub fn new(processor: P) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }
}

impl<P: PaymentProcessor> EscrowLedger<P> {
    /// Authorize a hold and stage a `Held` record for the invite.
    pub fn hold<R>(
        &self,
        records: &mut R,
        invite_id: InviteId,
        money: Money,
        fingerprint: PaymentFingerprint,
        at: DateTime<Utc>,
    ) -> Result<EscrowRecord, EscrowError>
    where
        R: EscrowRecords + ?Sized,
    {
        if records.load_escrow(invite_id)?.is_some() {
            return Err(EscrowError::AlreadyHeld(invite_id));
        }

        let request = HoldRequest {
            escrow_id: EscrowId::new(),
            invite_id,
            money,
            fingerprint,
        };
        let reference = self.processor.authorize(&request).inspect_err(|e| {
            tracing::warn!(invite_id = %invite_id, error = %e, "escrow hold refused");
        })?;

        let record = EscrowRecord::held(
            request.escrow_id,
            invite_id,
            request.money,
            reference,
            request.fingerprint,
            at,
        );
        records.stage_escrow(record.clone())?;

        tracing::info!(
            invite_id = %invite_id,
            escrow_id = %record.id_typed(),
            amount = %record.money(),
            "escrow held"
        );
        Ok(record)
    }

    /// Stage Held → Captured. No-op when already captured; fails when voided.
    ///
    /// The processor is not contacted here; see [`EscrowLedger::finalize`].
    pub fn capture<R>(
        &self,
        records: &mut R,
        invite_id: InviteId,
        at: DateTime<Utc>,
    ) -> Result<LedgerOutcome, EscrowError>
    where
        R: EscrowRecords + ?Sized,
    {
        self.settle(records, invite_id, EscrowStatus::Captured, at)
    }

    /// Stage Held → Voided. No-op when already voided; fails when captured.
    pub fn void<R>(
        &self,
        records: &mut R,
        invite_id: InviteId,
        at: DateTime<Utc>,
    ) -> Result<LedgerOutcome, EscrowError>
    where
        R: EscrowRecords + ?Sized,
    {
        self.settle(records, invite_id, EscrowStatus::Voided, at)
    }

    /// Carry a staged settlement out at the processor. Call only once the
    /// staged record is certain to commit; a `Held` record needs nothing.
    ///
    /// Processor capture and release are idempotent per reference, so
    /// repeating this for an already settled record is harmless.
    pub fn finalize(&self, record: &EscrowRecord) -> Result<(), EscrowError> {
        let reference = record.external_reference();
        let result = match record.status() {
            EscrowStatus::Held => return Ok(()),
            EscrowStatus::Captured => self.processor.capture(reference),
            EscrowStatus::Voided => self.processor.release(reference),
        };
        match &result {
            Ok(()) => tracing::info!(
                invite_id = %record.invite_id(),
                status = ?record.status(),
                "escrow settled"
            ),
            Err(e) => tracing::warn!(
                invite_id = %record.invite_id(),
                reference = %reference,
                error = %e,
                "processor settlement failed"
            ),
        }
        result
    }

    /// Compensation for a hold whose record never got committed.
    pub fn release_authorization(&self, record: &EscrowRecord) -> Result<(), EscrowError> {
        self.processor.release(record.external_reference())
    }

    fn settle<R>(
        &self,
        records: &mut R,
        invite_id: InviteId,
        target: EscrowStatus,
        at: DateTime<Utc>,
    ) -> Result<LedgerOutcome, EscrowError>
    where
        R: EscrowRecords + ?Sized,
    {
        let operation = match target {
            EscrowStatus::Captured => "capture",
            EscrowStatus::Voided => "void",
            EscrowStatus::Held => "hold",
        };

        let mut record = records
            .load_escrow(invite_id)?
            .ok_or(EscrowError::NotFound(invite_id))?;

        if record.status() == target {
            tracing::debug!(invite_id = %invite_id, operation, "escrow already settled; no-op");
            return Ok(LedgerOutcome::Unchanged(record));
        }
        if record.status() != EscrowStatus::Held {
            return Err(EscrowError::InvalidState {
                operation,
                status: record.status(),
            });
        }

        if target == EscrowStatus::Held {
            return Err(EscrowError::InvalidState {
                operation,
                status: record.status(),
            });
        }

        record.settle(target, at);
        records.stage_escrow(record.clone())?;

        tracing::debug!(invite_id = %invite_id, status = ?target, "escrow settlement staged");
        Ok(LedgerOutcome::Applied(record))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use super::*;
    use crate::processor::SimulatedProcessor;
    use meetpay_core::Currency;

    #[derive(Default)]
    struct MapRecords {
        inner: HashMap<InviteId, EscrowRecord>,
    }

    impl EscrowRecords for MapRecords {
        fn load_escrow(&mut self, invite_id: InviteId) -> Result<Option<EscrowRecord>, EscrowError> {
            Ok(self.inner.get(&invite_id).cloned())
        }

        fn stage_escrow(&mut self, record: EscrowRecord) -> Result<(), EscrowError> {
            self.inner.insert(record.invite_id(), record);
            Ok(())
        }
    }

    fn hundred_usd() -> Money {
        Money::new(Decimal::new(100, 0), Currency::usd()).unwrap()
    }

    fn card() -> PaymentFingerprint {
        PaymentFingerprint::parse("4242").unwrap()
    }

    fn held() -> (EscrowLedger<SimulatedProcessor>, MapRecords, InviteId) {
        let ledger = EscrowLedger::new(SimulatedProcessor::default());
        let mut records = MapRecords::default();
        let invite_id = InviteId::new();
        ledger
            .hold(&mut records, invite_id, hundred_usd(), card(), Utc::now())
            .unwrap();
        (ledger, records, invite_id)
    }

    #[test]
    fn hold_stages_a_held_record() {
        let (ledger, mut records, invite_id) = held();
        let record = records.load_escrow(invite_id).unwrap().unwrap();
        assert_eq!(record.status(), EscrowStatus::Held);
        assert_eq!(record.money().amount(), Decimal::new(100, 0));
        assert!(record.external_reference().as_str().starts_with("pi_sim_"));
        assert_eq!(ledger.processor().open_authorizations(), 1);
    }

    #[test]
    fn second_hold_for_same_invite_is_rejected() {
        let (ledger, mut records, invite_id) = held();
        let err = ledger
            .hold(&mut records, invite_id, hundred_usd(), card(), Utc::now())
            .unwrap_err();
        assert_eq!(err, EscrowError::AlreadyHeld(invite_id));
    }

    #[test]
    fn declined_hold_stages_nothing() {
        let ledger = EscrowLedger::new(SimulatedProcessor::default());
        let mut records = MapRecords::default();
        let invite_id = InviteId::new();
        let declined = PaymentFingerprint::parse("0002").unwrap();

        let err = ledger
            .hold(&mut records, invite_id, hundred_usd(), declined, Utc::now())
            .unwrap_err();
        assert!(matches!(err, EscrowError::Declined(_)));
        assert!(records.load_escrow(invite_id).unwrap().is_none());
    }

    #[test]
    fn capture_twice_is_a_no_op() {
        let (ledger, mut records, invite_id) = held();
        let first = ledger.capture(&mut records, invite_id, Utc::now()).unwrap();
        let second = ledger.capture(&mut records, invite_id, Utc::now()).unwrap();

        assert!(first.is_applied());
        assert!(!second.is_applied());
        assert_eq!(second.record().status(), EscrowStatus::Captured);
        assert_eq!(first.record().updated_at(), second.record().updated_at());
    }

    #[test]
    fn captured_funds_cannot_be_voided() {
        let (ledger, mut records, invite_id) = held();
        ledger.capture(&mut records, invite_id, Utc::now()).unwrap();

        let err = ledger.void(&mut records, invite_id, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            EscrowError::InvalidState {
                operation: "void",
                status: EscrowStatus::Captured
            }
        );
    }

    #[test]
    fn voided_funds_cannot_be_captured() {
        let (ledger, mut records, invite_id) = held();
        ledger.void(&mut records, invite_id, Utc::now()).unwrap();
        assert!(ledger.void(&mut records, invite_id, Utc::now()).is_ok());

        let err = ledger.capture(&mut records, invite_id, Utc::now()).unwrap_err();
        assert!(matches!(err, EscrowError::InvalidState { operation: "capture", .. }));
    }

    #[test]
    fn staging_a_settlement_leaves_the_processor_untouched() {
        let (ledger, mut records, invite_id) = held();

        let outcome = ledger.void(&mut records, invite_id, Utc::now()).unwrap();
        assert_eq!(outcome.record().status(), EscrowStatus::Voided);
        assert_eq!(ledger.processor().open_authorizations(), 1);
        assert_eq!(ledger.processor().released_count(), 0);

        ledger.finalize(outcome.record()).unwrap();
        ledger.finalize(outcome.record()).unwrap();
        assert_eq!(ledger.processor().open_authorizations(), 0);
        assert_eq!(ledger.processor().released_count(), 1);
    }

    #[test]
    fn finalize_failure_leaves_the_authorization_open() {
        let (ledger, mut records, invite_id) = held();
        let outcome = ledger.capture(&mut records, invite_id, Utc::now()).unwrap();

        ledger.processor().set_settlement_online(false);
        let err = ledger.finalize(outcome.record()).unwrap_err();
        assert!(matches!(err, EscrowError::Processor(_)));
        assert_eq!(ledger.processor().open_authorizations(), 1);
    }

    #[test]
    fn finalizing_a_held_record_is_a_no_op() {
        let (ledger, mut records, invite_id) = held();
        let record = records.load_escrow(invite_id).unwrap().unwrap();
        ledger.processor().set_settlement_online(false);
        assert!(ledger.finalize(&record).is_ok());
        assert_eq!(ledger.processor().open_authorizations(), 1);
    }

    #[test]
    fn settling_unknown_invite_is_not_found() {
        let ledger = EscrowLedger::new(SimulatedProcessor::default());
        let mut records = MapRecords::default();
        let invite_id = InviteId::new();
        let err = ledger.capture(&mut records, invite_id, Utc::now()).unwrap_err();
        assert_eq!(err, EscrowError::NotFound(invite_id));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of capture/void requests arrives, the
        /// first successful settlement is final and the other one never lands.
        #[test]
        fn first_settlement_is_final(ops in prop::collection::vec(any::<bool>(), 1..12)) {
            let (ledger, mut records, invite_id) = held();
            let first_target = if ops[0] { EscrowStatus::Captured } else { EscrowStatus::Voided };

            for capture in ops {
                let res = if capture {
                    ledger.capture(&mut records, invite_id, Utc::now())
                } else {
                    ledger.void(&mut records, invite_id, Utc::now())
                };
                let wanted = if capture { EscrowStatus::Captured } else { EscrowStatus::Voided };
                prop_assert_eq!(res.is_ok(), wanted == first_target);
            }

            let record = records.load_escrow(invite_id).unwrap().unwrap();
            prop_assert_eq!(record.status(), first_target);
        }
    }
}
