//! Time slot rules shared by invite creation and booking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meetpay_core::DomainError;

/// How strictly slots are checked against the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPolicy {
    /// Offered slots and chosen times must lie strictly after "now".
    pub require_future: bool,
    /// Upper bound on the number of slots one invite may offer.
    pub max_slots: usize,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            require_future: true,
            max_slots: 64,
        }
    }
}

impl SlotPolicy {
    /// Deduplicate and order the offered slots, rejecting ones in the past.
    ///
    /// An empty list is valid and means "any future time".
    pub fn normalize(
        &self,
        mut slots: Vec<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, DomainError> {
        slots.sort();
        slots.dedup();

        if slots.len() > self.max_slots {
            return Err(DomainError::validation(format!(
                "at most {} time slots may be offered",
                self.max_slots
            )));
        }
        if self.require_future {
            if let Some(past) = slots.iter().find(|s| **s <= now) {
                return Err(DomainError::validation(format!(
                    "time slot {past} is not in the future"
                )));
            }
        }
        Ok(slots)
    }

    /// Check a chosen time against the invite's offered slots.
    ///
    /// With offered slots, the choice must be one of them exactly. Without,
    /// any time strictly after `now` is accepted. `offered` must be the output
    /// of [`SlotPolicy::normalize`].
    pub fn check_choice(
        &self,
        offered: &[DateTime<Utc>],
        chosen: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if offered.is_empty() {
            if chosen <= now {
                return Err(DomainError::validation("scheduled time must be in the future"));
            }
            return Ok(());
        }

        if offered.binary_search(&chosen).is_err() {
            return Err(DomainError::validation(format!(
                "{chosen} is not one of the offered time slots"
            )));
        }
        if self.require_future && chosen <= now {
            return Err(DomainError::validation(format!(
                "time slot {chosen} has already passed"
            )));
        }
        Ok(())
    }
}
