// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Rent plan proposals and their lifecycle.
//!
//! Implemented State Machine
//!
//! ```text
//!  Pending ──accept──► Accepted ──payment confirmed──► Completed
//!     │                   │
//!     ├──reject──► Rejected
//!     │                   │
//!     └──cancel──► Cancelled ◄──cancel──┘
//! ```
//!
//! A confirmation that lands on a plan cancelled after acceptance still
//! completes it; the caller reports that as a reconciliation anomaly.

use crate::base::{IntentId, PlanId, UserId, minor_units};
use crate::error::LedgerError;
use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Pending,
    Accepted,
    Completed,
    Rejected,
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Transitions reachable through tenant and landlord actions.
    pub fn can_transition_to(self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Accepted, Completed)
                | (Accepted, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// E-signature progress. Cosmetic: never gates payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningStatus {
    Pending,
    Viewed,
    Signed,
    Declined,
}

impl SigningStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Viewed => 1,
            Self::Signed | Self::Declined => 2,
        }
    }
}

/// Lease terms proposed by a landlord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTerms {
    pub monthly_rent: Decimal,
    pub deposit: Decimal,
    pub duration_months: u32,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

impl PlanTerms {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.monthly_rent <= Decimal::ZERO {
            return Err(LedgerError::InvalidTerms("monthly rent must be positive"));
        }
        if self.deposit <= Decimal::ZERO {
            return Err(LedgerError::InvalidTerms("deposit must be positive"));
        }
        // Both amounts end up at the gateway in whole cents.
        if minor_units(self.monthly_rent).is_err() {
            return Err(LedgerError::InvalidTerms("monthly rent is not a payable amount"));
        }
        if minor_units(self.deposit).is_err() {
            return Err(LedgerError::InvalidTerms("deposit is not a payable amount"));
        }
        if self.duration_months == 0 {
            return Err(LedgerError::InvalidTerms("duration must be at least one month"));
        }
        Ok(())
    }
}

/// Result of applying a payment confirmation to a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlanConfirmation {
    /// Plan moved to completed from `previous` (accepted, or cancelled on a race).
    Completed { previous: PlanStatus },
    /// Duplicate delivery; nothing changed.
    AlreadyCompleted,
    /// Event carries an intent this plan never issued.
    IntentMismatch,
    /// Plan is not in a state that expects a payment.
    NotAwaitingPayment(PlanStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentPlan {
    pub id: PlanId,
    pub tenant_id: UserId,
    pub landlord_id: UserId,
    pub monthly_rent: Decimal,
    pub deposit: Decimal,
    pub duration_months: u32,
    pub start_date: Option<NaiveDate>,
    pub status: PlanStatus,
    pub proposed_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub next_due_date: Option<NaiveDate>,
    pub payment_intent_id: Option<IntentId>,
    pub signing_status: SigningStatus,
    pub signing_submission_id: Option<String>,
    pub signing_url: Option<String>,
}

impl RentPlan {
    pub(crate) fn propose(
        id: PlanId,
        landlord_id: UserId,
        tenant_id: UserId,
        terms: PlanTerms,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        terms.validate()?;
        Ok(Self {
            id,
            tenant_id,
            landlord_id,
            monthly_rent: terms.monthly_rent,
            deposit: terms.deposit,
            duration_months: terms.duration_months,
            start_date: terms.start_date,
            status: PlanStatus::Pending,
            proposed_at: now,
            reviewed_at: None,
            accepted_at: None,
            completed_at: None,
            cancelled_at: None,
            next_due_date: None,
            payment_intent_id: None,
            signing_status: SigningStatus::Pending,
            signing_submission_id: None,
            signing_url: None,
        })
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.status == PlanStatus::Pending
                || self.status == PlanStatus::Rejected
                || self.payment_intent_id.is_some()
                || (self.status == PlanStatus::Cancelled && self.accepted_at.is_none()),
            "Invariant violated: plan {} is {} without a payment intent",
            self.id,
            self.status
        );
        debug_assert!(
            self.status != PlanStatus::Completed || self.completed_at.is_some(),
            "Invariant violated: plan {} completed without a completion date",
            self.id
        );
    }

    fn require(&self, status: PlanStatus, action: &'static str) -> Result<(), LedgerError> {
        if self.status != status {
            return Err(LedgerError::InvalidState {
                action,
                state: self.status.as_str(),
            });
        }
        Ok(())
    }

    /// Checks that acceptance is legal before a payment intent is requested.
    pub(crate) fn ensure_acceptable(&self) -> Result<(), LedgerError> {
        self.require(PlanStatus::Pending, "accept")
    }

    /// Pending → Accepted. Stores the one and only payment intent.
    pub(crate) fn accept(&mut self, intent: IntentId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ensure_acceptable()?;
        self.status = PlanStatus::Accepted;
        self.payment_intent_id = Some(intent);
        self.reviewed_at = Some(now);
        self.accepted_at = Some(now);
        self.assert_invariants();
        Ok(())
    }

    /// Pending → Rejected.
    pub(crate) fn reject(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.require(PlanStatus::Pending, "reject")?;
        self.status = PlanStatus::Rejected;
        self.reviewed_at = Some(now);
        self.assert_invariants();
        Ok(())
    }

    /// Pending | Accepted → Cancelled.
    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(PlanStatus::Cancelled) {
            return Err(LedgerError::InvalidState {
                action: "cancel",
                state: self.status.as_str(),
            });
        }
        self.status = PlanStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.assert_invariants();
        Ok(())
    }

    /// Applies a payment confirmation. Duplicate deliveries are checked first.
    pub(crate) fn confirm_payment(&mut self, intent: &IntentId, now: DateTime<Utc>) -> PlanConfirmation {
        if self.status == PlanStatus::Completed {
            return PlanConfirmation::AlreadyCompleted;
        }
        if self.payment_intent_id.as_ref() != Some(intent) {
            return PlanConfirmation::IntentMismatch;
        }
        let from = self.status;
        match from {
            PlanStatus::Accepted | PlanStatus::Cancelled => {}
            other => return PlanConfirmation::NotAwaitingPayment(other),
        }

        let base = self.start_date.unwrap_or_else(|| now.date_naive());
        self.next_due_date = base.checked_add_months(Months::new(1));
        self.status = PlanStatus::Completed;
        self.completed_at = Some(now);
        self.assert_invariants();

        PlanConfirmation::Completed { previous: from }
    }

    /// Moves the signing side-channel forward. Regressions are ignored.
    pub(crate) fn record_signing(&mut self, status: SigningStatus) -> bool {
        if status.rank() <= self.signing_status.rank() {
            return false;
        }
        self.signing_status = status;
        true
    }

    /// Plain-text lease sent to the signature provider.
    pub(crate) fn lease_document(&self, landlord_name: &str, tenant_name: &str) -> Vec<u8> {
        let start = self
            .start_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "on deposit clearance".to_string());
        format!(
            "RESIDENTIAL LEASE AGREEMENT\n\
             Plan: {}\n\
             Landlord: {}\n\
             Tenant: {}\n\
             Monthly rent: {}\n\
             Security deposit: {}\n\
             Term: {} month(s)\n\
             Start: {}\n",
            self.id,
            landlord_name,
            tenant_name,
            self.monthly_rent.round_dp(2),
            self.deposit.round_dp(2),
            self.duration_months,
            start,
        )
        .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap()
    }

    fn terms() -> PlanTerms {
        PlanTerms {
            monthly_rent: dec!(1500),
            deposit: dec!(3000),
            duration_months: 12,
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1),
        }
    }

    fn pending() -> RentPlan {
        RentPlan::propose(PlanId(1), UserId(10), UserId(20), terms(), now()).unwrap()
    }

    #[test]
    fn propose_rejects_non_positive_terms() {
        let mut bad = terms();
        bad.deposit = Decimal::ZERO;
        assert_eq!(
            RentPlan::propose(PlanId(1), UserId(1), UserId(2), bad, now()),
            Err(LedgerError::InvalidTerms("deposit must be positive"))
        );

        let mut bad = terms();
        bad.duration_months = 0;
        assert!(RentPlan::propose(PlanId(1), UserId(1), UserId(2), bad, now()).is_err());
    }

    #[test]
    fn terms_must_be_payable_in_cents() {
        let mut bad = terms();
        bad.deposit = dec!(0.004);
        assert_eq!(
            bad.validate(),
            Err(LedgerError::InvalidTerms("deposit is not a payable amount"))
        );

        let mut bad = terms();
        bad.deposit = Decimal::MAX;
        assert_eq!(
            bad.validate(),
            Err(LedgerError::InvalidTerms("deposit is not a payable amount"))
        );

        let mut bad = terms();
        bad.monthly_rent = dec!(0.001);
        assert_eq!(
            bad.validate(),
            Err(LedgerError::InvalidTerms("monthly rent is not a payable amount"))
        );
    }

    #[test]
    fn accept_stores_intent_and_review_dates() {
        let mut plan = pending();
        plan.accept(IntentId::from("pi_1"), now()).unwrap();
        assert_eq!(plan.status, PlanStatus::Accepted);
        assert_eq!(plan.payment_intent_id, Some(IntentId::from("pi_1")));
        assert_eq!(plan.reviewed_at, Some(now()));
        assert_eq!(plan.accepted_at, Some(now()));
    }

    #[test]
    fn accept_twice_is_invalid() {
        let mut plan = pending();
        plan.accept(IntentId::from("pi_1"), now()).unwrap();
        let result = plan.accept(IntentId::from("pi_2"), now());
        assert_eq!(
            result,
            Err(LedgerError::InvalidState {
                action: "accept",
                state: "accepted"
            })
        );
        assert_eq!(plan.payment_intent_id, Some(IntentId::from("pi_1")));
    }

    #[test]
    fn reject_only_from_pending() {
        let mut plan = pending();
        plan.reject(now()).unwrap();
        assert_eq!(plan.status, PlanStatus::Rejected);
        assert!(plan.cancel(now()).is_err());
    }

    #[test]
    fn cancel_forbidden_once_completed() {
        let mut plan = pending();
        let intent = IntentId::from("pi_1");
        plan.accept(intent.clone(), now()).unwrap();
        plan.confirm_payment(&intent, now());
        assert_eq!(
            plan.cancel(now()),
            Err(LedgerError::InvalidState {
                action: "cancel",
                state: "completed"
            })
        );
    }

    #[test]
    fn confirm_sets_next_due_date_from_start() {
        let mut plan = pending();
        let intent = IntentId::from("pi_1");
        plan.accept(intent.clone(), now()).unwrap();

        let outcome = plan.confirm_payment(&intent, now());
        assert_eq!(
            outcome,
            PlanConfirmation::Completed {
                previous: PlanStatus::Accepted
            }
        );
        assert_eq!(plan.next_due_date, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(plan.completed_at, Some(now()));
    }

    #[test]
    fn confirm_without_start_date_uses_today() {
        let mut t = terms();
        t.start_date = None;
        let mut plan = RentPlan::propose(PlanId(1), UserId(1), UserId(2), t, now()).unwrap();
        let intent = IntentId::from("pi_1");
        plan.accept(intent.clone(), now()).unwrap();
        plan.confirm_payment(&intent, now());
        assert_eq!(plan.next_due_date, NaiveDate::from_ymd_opt(2025, 2, 10));
    }

    #[test]
    fn duplicate_confirmation_is_noop() {
        let mut plan = pending();
        let intent = IntentId::from("pi_1");
        plan.accept(intent.clone(), now()).unwrap();
        plan.confirm_payment(&intent, now());
        let completed_at = plan.completed_at;

        let later = now() + chrono::Duration::days(3);
        assert_eq!(
            plan.confirm_payment(&intent, later),
            PlanConfirmation::AlreadyCompleted
        );
        assert_eq!(plan.completed_at, completed_at);
    }

    #[test]
    fn confirm_with_foreign_intent_is_mismatch() {
        let mut plan = pending();
        plan.accept(IntentId::from("pi_1"), now()).unwrap();
        assert_eq!(
            plan.confirm_payment(&IntentId::from("pi_other"), now()),
            PlanConfirmation::IntentMismatch
        );
        assert_eq!(plan.status, PlanStatus::Accepted);
    }

    #[test]
    fn confirm_after_cancel_completes_and_flags() {
        let mut plan = pending();
        let intent = IntentId::from("pi_1");
        plan.accept(intent.clone(), now()).unwrap();
        plan.cancel(now()).unwrap();

        let outcome = plan.confirm_payment(&intent, now());
        assert_eq!(
            outcome,
            PlanConfirmation::Completed {
                previous: PlanStatus::Cancelled
            }
        );
        assert_eq!(plan.status, PlanStatus::Completed);
    }

    #[test]
    fn signing_status_only_moves_forward() {
        let mut plan = pending();
        assert!(plan.record_signing(SigningStatus::Viewed));
        assert!(plan.record_signing(SigningStatus::Signed));
        assert!(!plan.record_signing(SigningStatus::Viewed));
        assert!(!plan.record_signing(SigningStatus::Declined));
        assert_eq!(plan.signing_status, SigningStatus::Signed);
    }

    #[test]
    fn legal_transitions_table() {
        use PlanStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Accepted));
        assert!(!Rejected.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Completed.is_terminal());
    }
}
