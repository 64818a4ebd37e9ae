//! Value objects: equality by value, not identity.
//!
//! Value objects have **no identity**; two values with the same attributes are
//! the same value. They are immutable: "modifying" one means building a new one.

use core::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Marker trait for value objects.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// ISO-4217 style currency code (three uppercase ASCII letters).
///
/// Amounts in different currencies are never combined or converted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, DomainError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "currency must be a three-letter code, got '{code}'"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Currency {}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

/// A strictly positive amount of money in one currency.
///
/// Amounts carry at most two fractional digits so they map exactly onto the
/// minor units a payment processor works in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, DomainError> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation("amount must be positive"));
        }
        if amount.normalize().scale() > 2 {
            return Err(DomainError::validation(
                "amount must have at most two fractional digits",
            ));
        }
        let money = Self { amount, currency };
        if money.minor_units().is_none() {
            return Err(DomainError::validation(
                "amount exceeds the largest supported value",
            ));
        }
        Ok(money)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Amount in minor units (cents for USD). `None` if it does not fit an `i64`.
    pub fn minor_units(&self) -> Option<i64> {
        self.amount.checked_mul(Decimal::ONE_HUNDRED)?.trunc().to_i64()
    }
}

impl ValueObject for Money {}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_is_normalized_to_uppercase() {
        assert_eq!(Currency::parse("usd").unwrap(), Currency::usd());
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("U$D").is_err());
    }

    #[test]
    fn money_rejects_non_positive_amounts() {
        assert!(Money::new(Decimal::ZERO, Currency::usd()).is_err());
        assert!(Money::new(Decimal::new(-500, 2), Currency::usd()).is_err());
    }

    #[test]
    fn money_rejects_sub_cent_precision_but_accepts_trailing_zeros() {
        assert!(Money::new(Decimal::new(10001, 3), Currency::usd()).is_err());
        let m = Money::new(Decimal::new(100500, 3), Currency::usd()).unwrap();
        assert_eq!(m.minor_units(), Some(10050));
    }

    #[test]
    fn money_rejects_amounts_without_minor_unit_representation() {
        let err = Money::new(Decimal::MAX, Currency::usd()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let too_big = Decimal::from(i64::MAX / 100 + 1);
        assert!(Money::new(too_big, Currency::usd()).is_err());
        let largest = Decimal::from(i64::MAX / 100);
        assert!(Money::new(largest, Currency::usd()).unwrap().minor_units().is_some());
    }

    #[test]
    fn money_serializes_amount_as_string() {
        let m = Money::new(Decimal::new(10000, 2), Currency::usd()).unwrap();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["amount"], "100.00");
        assert_eq!(json["currency"], "USD");
    }
}
