use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use meetpay_booking::SlotPolicy;
use meetpay_core::{AggregateRoot, Currency, DomainError, InviteId, Money, UserId};
use meetpay_escrow::{EscrowStatus, PaymentFingerprint};

/// Invite status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Active,
    Booked,
    Completed,
    Cancelled,
}

impl InviteStatus {
    /// The only way an invite status is ever computed.
    ///
    /// - escrow voided → `Cancelled`
    /// - escrow captured and meeting confirmed → `Completed`
    /// - an open booking → `Booked`
    /// - otherwise → `Active`
    pub fn derive(has_open_booking: bool, meeting_confirmed: bool, escrow: EscrowStatus) -> Self {
        match escrow {
            EscrowStatus::Voided => InviteStatus::Cancelled,
            EscrowStatus::Captured if meeting_confirmed => InviteStatus::Completed,
            _ if has_open_booking => InviteStatus::Booked,
            _ => InviteStatus::Active,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InviteStatus::Completed | InviteStatus::Cancelled)
    }
}

/// Input for `create_invite`, as received from the outer layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvite {
    pub creator_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub amount: Decimal,
    /// Falls back to the engine's default currency when absent.
    pub currency: Option<Currency>,
    pub duration_minutes: u32,
    /// Empty means "any future time".
    #[serde(default)]
    pub available_slots: Vec<DateTime<Utc>>,
    /// Last four digits of the card to hold funds against.
    pub payment_fingerprint: String,
}

/// Aggregate root: a paid offer for a block of someone's time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    id: InviteId,
    creator_id: UserId,
    title: String,
    description: Option<String>,
    money: Money,
    duration_minutes: u32,
    status: InviteStatus,
    meeting_confirmed: bool,
    available_time_slots: Vec<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Invite {
    /// Validate a creation request into a new `Active` invite plus the card
    /// fingerprint the escrow hold must be placed against.
    pub fn open(
        id: InviteId,
        request: NewInvite,
        slot_policy: &SlotPolicy,
        default_currency: &Currency,
        now: DateTime<Utc>,
    ) -> Result<(Self, PaymentFingerprint), DomainError> {
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("title is required"));
        }
        if request.duration_minutes == 0 {
            return Err(DomainError::validation("duration_minutes must be positive"));
        }

        let currency = request.currency.unwrap_or_else(|| default_currency.clone());
        let money = Money::new(request.amount, currency)?;
        let slots = slot_policy.normalize(request.available_slots, now)?;
        let fingerprint = PaymentFingerprint::parse(&request.payment_fingerprint)?;
        let description = request
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let invite = Self {
            id,
            creator_id: request.creator_id,
            title,
            description,
            money,
            duration_minutes: request.duration_minutes,
            status: InviteStatus::derive(false, false, EscrowStatus::Held),
            meeting_confirmed: false,
            available_time_slots: slots,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        Ok((invite, fingerprint))
    }

    pub fn id_typed(&self) -> InviteId {
        self.id
    }

    pub fn creator_id(&self) -> &UserId {
        &self.creator_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn money(&self) -> &Money {
        &self.money
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn status(&self) -> InviteStatus {
        self.status
    }

    pub fn meeting_confirmed(&self) -> bool {
        self.meeting_confirmed
    }

    pub fn available_time_slots(&self) -> &[DateTime<Utc>] {
        &self.available_time_slots
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_creator(&self, user: &UserId) -> bool {
        &self.creator_id == user
    }

    /// Only the creator may confirm or cancel.
    pub fn ensure_creator(&self, caller: &UserId, action: &str) -> Result<(), DomainError> {
        if !self.is_creator(caller) {
            return Err(DomainError::unauthorized(format!(
                "only the creator may {action} invite {}",
                self.id
            )));
        }
        Ok(())
    }

    /// Mark the meeting as having taken place (creator confirmation).
    pub fn confirm_meeting(&mut self) {
        self.meeting_confirmed = true;
    }

    /// Re-derive the status from the composite and advance the version.
    ///
    /// Called exactly once per state-changing unit of work, after the booking
    /// and escrow records have been staged.
    pub fn reconcile(&mut self, has_open_booking: bool, escrow: EscrowStatus, now: DateTime<Utc>) {
        self.status = InviteStatus::derive(has_open_booking, self.meeting_confirmed, escrow);
        self.updated_at = now;
        self.version += 1;
    }
}

impl AggregateRoot for Invite {
    type Id = InviteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use proptest::prelude::*;

    use super::*;

    fn request() -> NewInvite {
        NewInvite {
            creator_id: UserId::parse("u1").unwrap(),
            title: "  Portfolio review ".to_string(),
            description: Some("   ".to_string()),
            amount: Decimal::new(100, 0),
            currency: None,
            duration_minutes: 60,
            available_slots: vec![],
            payment_fingerprint: "4242".to_string(),
        }
    }

    fn open(req: NewInvite) -> Result<(Invite, PaymentFingerprint), DomainError> {
        Invite::open(
            InviteId::new(),
            req,
            &SlotPolicy::default(),
            &Currency::usd(),
            Utc::now(),
        )
    }

    #[test]
    fn open_creates_active_invite_in_default_currency() {
        let (invite, fingerprint) = open(request()).unwrap();
        assert_eq!(invite.status(), InviteStatus::Active);
        assert_eq!(invite.title(), "Portfolio review");
        assert_eq!(invite.description(), None);
        assert_eq!(invite.money().currency(), &Currency::usd());
        assert_eq!(invite.version(), 1);
        assert!(!invite.meeting_confirmed());
        assert_eq!(fingerprint.as_str(), "4242");
    }

    #[test]
    fn open_rejects_invalid_requests() {
        let mut zero_amount = request();
        zero_amount.amount = Decimal::ZERO;
        assert!(matches!(open(zero_amount), Err(DomainError::Validation(_))));

        let mut zero_duration = request();
        zero_duration.duration_minutes = 0;
        assert!(matches!(open(zero_duration), Err(DomainError::Validation(_))));

        let mut no_title = request();
        no_title.title = " ".to_string();
        assert!(matches!(open(no_title), Err(DomainError::Validation(_))));

        let mut bad_card = request();
        bad_card.payment_fingerprint = "12".to_string();
        assert!(matches!(open(bad_card), Err(DomainError::Validation(_))));

        let mut past_slot = request();
        past_slot.available_slots = vec![Utc::now() - Duration::hours(1)];
        assert!(matches!(open(past_slot), Err(DomainError::Validation(_))));
    }

    #[test]
    fn open_normalizes_slots() {
        let slot = Utc::now() + Duration::days(2);
        let earlier = Utc::now() + Duration::days(1);
        let mut req = request();
        req.available_slots = vec![slot, earlier, slot];

        let (invite, _) = open(req).unwrap();
        assert_eq!(invite.available_time_slots(), &[earlier, slot]);
    }

    #[test]
    fn only_creator_passes_ensure_creator() {
        let (invite, _) = open(request()).unwrap();
        assert!(invite.ensure_creator(&UserId::parse("u1").unwrap(), "confirm").is_ok());
        let err = invite
            .ensure_creator(&UserId::parse("u2").unwrap(), "confirm")
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn reconcile_bumps_version_and_derives_status() {
        let (mut invite, _) = open(request()).unwrap();
        invite.reconcile(true, EscrowStatus::Held, Utc::now());
        assert_eq!(invite.status(), InviteStatus::Booked);
        assert_eq!(invite.version(), 2);

        invite.confirm_meeting();
        invite.reconcile(true, EscrowStatus::Captured, Utc::now());
        assert_eq!(invite.status(), InviteStatus::Completed);
        assert_eq!(invite.version(), 3);
    }

    fn escrow_status() -> impl Strategy<Value = EscrowStatus> {
        prop_oneof![
            Just(EscrowStatus::Held),
            Just(EscrowStatus::Captured),
            Just(EscrowStatus::Voided),
        ]
    }

    proptest! {
        /// Property: a terminal status is only ever derived from a settled
        /// escrow, and a settled escrow never leaves the invite open.
        #[test]
        fn terminal_status_iff_escrow_settled(
            open_booking in any::<bool>(),
            confirmed in any::<bool>(),
            escrow in escrow_status(),
        ) {
            let status = InviteStatus::derive(open_booking, confirmed, escrow);
            if status.is_terminal() {
                prop_assert!(escrow.is_settled());
            }
            if escrow == EscrowStatus::Voided {
                prop_assert_eq!(status, InviteStatus::Cancelled);
            }
            if escrow == EscrowStatus::Held {
                prop_assert_eq!(
                    status,
                    if open_booking { InviteStatus::Booked } else { InviteStatus::Active }
                );
            }
        }
    }
}
