//! Payment processor seam.
//!
//! In production this would be a card processor's authorize/capture/cancel API.
//! `SimulatedProcessor` is a deterministic in-process stand-in with the same
//! contract: capture and release are idempotent per reference, and a released
//! authorization can never be captured (nor the reverse).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use meetpay_core::{EscrowId, InviteId, Money};

use crate::error::EscrowError;
use crate::record::{PaymentFingerprint, ProcessorReference};

/// Everything the processor needs to place a hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldRequest {
    pub escrow_id: EscrowId,
    pub invite_id: InviteId,
    pub money: Money,
    pub fingerprint: PaymentFingerprint,
}

pub trait PaymentProcessor: Send + Sync {
    /// Place a hold for the requested amount; returns the processor's token.
    fn authorize(&self, request: &HoldRequest) -> Result<ProcessorReference, EscrowError>;

    /// Settle a hold to the payee. Capturing twice is a no-op.
    fn capture(&self, reference: &ProcessorReference) -> Result<(), EscrowError>;

    /// Release a hold back to the payer. Releasing twice is a no-op.
    fn release(&self, reference: &ProcessorReference) -> Result<(), EscrowError>;
}

impl<P> PaymentProcessor for Arc<P>
where
    P: PaymentProcessor + ?Sized,
{
    fn authorize(&self, request: &HoldRequest) -> Result<ProcessorReference, EscrowError> {
        (**self).authorize(request)
    }

    fn capture(&self, reference: &ProcessorReference) -> Result<(), EscrowError> {
        (**self).capture(reference)
    }

    fn release(&self, reference: &ProcessorReference) -> Result<(), EscrowError> {
        (**self).release(reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Authorization {
    Open,
    Captured,
    Released,
}

/// Deterministic in-process processor.
///
/// - references are `pi_sim_<escrow id>`
/// - holds against a declined fingerprint fail with `EscrowError::Declined`
/// - while settlement is offline, capture and release fail with
///   `EscrowError::Processor`
#[derive(Debug)]
pub struct SimulatedProcessor {
    declined: Vec<PaymentFingerprint>,
    settlement_online: AtomicBool,
    authorizations: Mutex<HashMap<ProcessorReference, Authorization>>,
}

impl SimulatedProcessor {
    pub fn new(declined: Vec<PaymentFingerprint>) -> Self {
        Self {
            declined,
            settlement_online: AtomicBool::new(true),
            authorizations: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_settlement_online(&self, online: bool) {
        self.settlement_online.store(online, Ordering::SeqCst);
    }

    /// Holds that are authorized but neither captured nor released.
    pub fn open_authorizations(&self) -> usize {
        self.count(Authorization::Open)
    }

    pub fn captured_count(&self) -> usize {
        self.count(Authorization::Captured)
    }

    pub fn released_count(&self) -> usize {
        self.count(Authorization::Released)
    }

    fn count(&self, state: Authorization) -> usize {
        self.authorizations
            .lock()
            .map(|auths| auths.values().filter(|s| **s == state).count())
            .unwrap_or(0)
    }

    fn settle(&self, reference: &ProcessorReference, target: Authorization) -> Result<(), EscrowError> {
        if !self.settlement_online.load(Ordering::SeqCst) {
            return Err(EscrowError::Processor("settlement is offline".to_string()));
        }

        let mut auths = self
            .authorizations
            .lock()
            .map_err(|_| EscrowError::Processor("lock poisoned".to_string()))?;

        let state = auths
            .get_mut(reference)
            .ok_or_else(|| EscrowError::Processor(format!("unknown reference {reference}")))?;

        match (*state, target) {
            (current, wanted) if current == wanted => Ok(()),
            (Authorization::Open, wanted) => {
                *state = wanted;
                Ok(())
            }
            (current, wanted) => Err(EscrowError::Processor(format!(
                "reference {reference} is {current:?}, cannot move to {wanted:?}"
            ))),
        }
    }
}

impl Default for SimulatedProcessor {
    fn default() -> Self {
        let declined = PaymentFingerprint::parse("0002").into_iter().collect();
        Self::new(declined)
    }
}

impl PaymentProcessor for SimulatedProcessor {
    fn authorize(&self, request: &HoldRequest) -> Result<ProcessorReference, EscrowError> {
        if self.declined.contains(&request.fingerprint) {
            return Err(EscrowError::Declined(format!(
                "card {} was declined",
                request.fingerprint
            )));
        }
        if request.money.minor_units().is_none() {
            return Err(EscrowError::Declined("amount out of range".to_string()));
        }

        let reference = ProcessorReference::new(format!(
            "pi_sim_{}",
            request.escrow_id.as_uuid().simple()
        ));

        let mut auths = self
            .authorizations
            .lock()
            .map_err(|_| EscrowError::Processor("lock poisoned".to_string()))?;
        auths.entry(reference.clone()).or_insert(Authorization::Open);

        Ok(reference)
    }

    fn capture(&self, reference: &ProcessorReference) -> Result<(), EscrowError> {
        self.settle(reference, Authorization::Captured)
    }

    fn release(&self, reference: &ProcessorReference) -> Result<(), EscrowError> {
        self.settle(reference, Authorization::Released)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use meetpay_core::Currency;

    fn request(fingerprint: &str) -> HoldRequest {
        HoldRequest {
            escrow_id: EscrowId::new(),
            invite_id: InviteId::new(),
            money: Money::new(Decimal::new(2500, 2), Currency::usd()).unwrap(),
            fingerprint: PaymentFingerprint::parse(fingerprint).unwrap(),
        }
    }

    #[test]
    fn references_are_derived_from_the_escrow_id() {
        let processor = SimulatedProcessor::default();
        let req = request("4242");
        let reference = processor.authorize(&req).unwrap();
        assert_eq!(
            reference.as_str(),
            format!("pi_sim_{}", req.escrow_id.as_uuid().simple())
        );
        assert_eq!(processor.authorize(&req).unwrap(), reference);
        assert_eq!(processor.open_authorizations(), 1);
    }

    #[test]
    fn declined_card_places_no_hold() {
        let processor = SimulatedProcessor::default();
        let err = processor.authorize(&request("0002")).unwrap_err();
        assert!(matches!(err, EscrowError::Declined(_)));
        assert_eq!(processor.open_authorizations(), 0);
    }

    #[test]
    fn capture_is_idempotent_and_blocks_release() {
        let processor = SimulatedProcessor::default();
        let reference = processor.authorize(&request("4242")).unwrap();

        processor.capture(&reference).unwrap();
        processor.capture(&reference).unwrap();
        assert!(processor.release(&reference).is_err());
        assert_eq!(processor.captured_count(), 1);
    }

    #[test]
    fn offline_settlement_leaves_hold_open() {
        let processor = SimulatedProcessor::default();
        let reference = processor.authorize(&request("4242")).unwrap();

        processor.set_settlement_online(false);
        assert!(matches!(processor.capture(&reference), Err(EscrowError::Processor(_))));
        assert_eq!(processor.open_authorizations(), 1);

        processor.set_settlement_online(true);
        processor.release(&reference).unwrap();
        assert_eq!(processor.released_count(), 1);
    }
}
