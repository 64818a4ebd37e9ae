//! Per-user dashboard summary.
//!
//! Tracks:
//! - `active_invites`: the user's invites nobody has booked yet
//! - `upcoming_meetings`: meetings ahead of the user as creator or invitee
//! - `paid_out`: amounts the user paid as creator of completed invites
//! - `earned`: amounts the user earned from completed bookings
//!
//! Totals are kept per currency; no conversion is performed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use meetpay_booking::{Booking, BookingStatus};
use meetpay_core::Currency;
use meetpay_invites::{InviteDetails, InviteStatus, Phase};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub active_invites: usize,
    pub upcoming_meetings: usize,
    pub paid_out: BTreeMap<Currency, Decimal>,
    pub earned: BTreeMap<Currency, Decimal>,
}

impl DashboardSummary {
    /// `created`: the user's invites. `booked`: the user's bookings, each
    /// with the invite it was made on.
    pub fn build<'a, I>(created: &[InviteDetails], booked: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (&'a Booking, &'a InviteDetails)>,
    {
        let mut summary = Self::default();

        for details in created {
            if details.is_pending() {
                summary.active_invites += 1;
            }
            if details.is_upcoming(now) {
                summary.upcoming_meetings += 1;
            }
            if details.invite.status() == InviteStatus::Completed {
                let money = details.invite.money();
                *summary.paid_out.entry(money.currency().clone()).or_default() += money.amount();
            }
        }

        for (booking, details) in booked {
            if Phase::of_booking(booking, now) == Phase::Upcoming {
                summary.upcoming_meetings += 1;
            }
            if booking.status() == BookingStatus::Completed {
                let money = details.invite.money();
                *summary.earned.entry(money.currency().clone()).or_default() += money.amount();
            }
        }

        summary
    }
}
