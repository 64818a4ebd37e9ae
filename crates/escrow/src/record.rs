use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meetpay_core::{Currency, DomainError, Entity, EscrowId, InviteId, Money};

/// Escrow record status lifecycle: `Held` is a liability that must end in
/// exactly one of `Captured` or `Voided`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Held,
    Captured,
    Voided,
}

impl EscrowStatus {
    pub fn is_settled(self) -> bool {
        !matches!(self, EscrowStatus::Held)
    }
}

/// Last four digits of the card the hold was placed against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentFingerprint(String);

impl PaymentFingerprint {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.len() != 4 || !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation(
                "payment fingerprint must be exactly four digits",
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PaymentFingerprint {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PaymentFingerprint> for String {
    fn from(value: PaymentFingerprint) -> Self {
        value.0
    }
}

impl core::fmt::Display for PaymentFingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "****{}", self.0)
    }
}

/// Opaque token the processor issued for the hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorReference(String);

impl ProcessorReference {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ProcessorReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escrowed funds backing one invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    id: EscrowId,
    invite_id: InviteId,
    money: Money,
    external_reference: ProcessorReference,
    fingerprint: PaymentFingerprint,
    status: EscrowStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EscrowRecord {
    /// A freshly authorized hold.
    pub fn held(
        id: EscrowId,
        invite_id: InviteId,
        money: Money,
        external_reference: ProcessorReference,
        fingerprint: PaymentFingerprint,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            invite_id,
            money,
            external_reference,
            fingerprint,
            status: EscrowStatus::Held,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn id_typed(&self) -> EscrowId {
        self.id
    }

    pub fn invite_id(&self) -> InviteId {
        self.invite_id
    }

    pub fn money(&self) -> &Money {
        &self.money
    }

    pub fn currency(&self) -> &Currency {
        self.money.currency()
    }

    pub fn external_reference(&self) -> &ProcessorReference {
        &self.external_reference
    }

    pub fn fingerprint(&self) -> &PaymentFingerprint {
        &self.fingerprint
    }

    pub fn status(&self) -> EscrowStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn settle(&mut self, status: EscrowStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
    }
}

impl Entity for EscrowRecord {
    type Id = EscrowId;
    type Owner = InviteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn owner(&self) -> &Self::Owner {
        &self.invite_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_accepts_exactly_four_digits() {
        assert_eq!(PaymentFingerprint::parse(" 4242 ").unwrap().as_str(), "4242");
        assert!(PaymentFingerprint::parse("424").is_err());
        assert!(PaymentFingerprint::parse("42a2").is_err());
        assert!(PaymentFingerprint::parse("42424").is_err());
    }

    #[test]
    fn fingerprint_display_is_masked() {
        let fp = PaymentFingerprint::parse("4242").unwrap();
        assert_eq!(fp.to_string(), "****4242");
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&EscrowStatus::Captured).unwrap(), "\"captured\"");
        assert!(!EscrowStatus::Held.is_settled());
        assert!(EscrowStatus::Voided.is_settled());
    }
}
