//! Engine configuration.
//!
//! Defaults are usable as-is; `from_env` overrides them from `MEETPAY_*`
//! environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use meetpay_booking::SlotPolicy;
use meetpay_core::Currency;
use meetpay_escrow::PaymentFingerprint;

pub const ENV_DEFAULT_CURRENCY: &str = "MEETPAY_DEFAULT_CURRENCY";
pub const ENV_REQUIRE_FUTURE_SLOTS: &str = "MEETPAY_REQUIRE_FUTURE_SLOTS";
pub const ENV_MAX_SLOTS_PER_INVITE: &str = "MEETPAY_MAX_SLOTS_PER_INVITE";
pub const ENV_LOCK_WAIT_MS: &str = "MEETPAY_LOCK_WAIT_MS";
pub const ENV_DECLINE_FINGERPRINTS: &str = "MEETPAY_DECLINE_FINGERPRINTS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Currency used when an invite request does not name one.
    pub default_currency: Currency,
    /// Reject slots and booking times that are not strictly in the future.
    pub require_future_slots: bool,
    pub max_slots_per_invite: usize,
    /// How long an operation waits for another operation on the same invite
    /// before failing with a conflict.
    pub lock_wait_ms: u64,
    /// Card fingerprints the simulated processor declines.
    pub decline_fingerprints: Vec<PaymentFingerprint>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let slots = SlotPolicy::default();
        Self {
            default_currency: Currency::usd(),
            require_future_slots: slots.require_future,
            max_slots_per_invite: slots.max_slots,
            lock_wait_ms: 2_000,
            decline_fingerprints: PaymentFingerprint::parse("0002").into_iter().collect(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by whichever `MEETPAY_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DEFAULT_CURRENCY) {
            config.default_currency = Currency::parse(&raw)
                .map_err(|e| ConfigError::invalid(ENV_DEFAULT_CURRENCY, &raw, e))?;
        }
        if let Some(raw) = lookup(ENV_REQUIRE_FUTURE_SLOTS) {
            config.require_future_slots = parse_bool(&raw)
                .ok_or_else(|| ConfigError::invalid(ENV_REQUIRE_FUTURE_SLOTS, &raw, "expected a boolean"))?;
        }
        if let Some(raw) = lookup(ENV_MAX_SLOTS_PER_INVITE) {
            config.max_slots_per_invite = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_MAX_SLOTS_PER_INVITE, &raw, e))?;
        }
        if let Some(raw) = lookup(ENV_LOCK_WAIT_MS) {
            config.lock_wait_ms = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_LOCK_WAIT_MS, &raw, e))?;
        }
        if let Some(raw) = lookup(ENV_DECLINE_FINGERPRINTS) {
            config.decline_fingerprints = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PaymentFingerprint::parse)
                .collect::<Result<_, _>>()
                .map_err(|e| ConfigError::invalid(ENV_DECLINE_FINGERPRINTS, &raw, e))?;
        }

        if config.max_slots_per_invite == 0 {
            return Err(ConfigError::invalid(
                ENV_MAX_SLOTS_PER_INVITE,
                "0",
                "must be at least 1",
            ));
        }
        Ok(config)
    }

    pub fn slot_policy(&self) -> SlotPolicy {
        SlotPolicy {
            require_future: self.require_future_slots,
            max_slots: self.max_slots_per_invite,
        }
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
