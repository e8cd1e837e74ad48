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

//! Bills issued by landlords to their tenants.
//!
//! ```text
//!  Unpaid ──initiate payment──► Unpaid (intent issued) ──confirmed──► Paid
//! ```
//!
//! `is_paid` never reverts and `paid_at` is written exactly once.

use crate::base::{BillId, IntentId, UserId, minor_units};
use crate::error::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillKind {
    Rent,
    Utilities,
    Maintenance,
    Other,
}

impl FromStr for BillKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rent" => Ok(Self::Rent),
            "utilities" | "utility" => Ok(Self::Utilities),
            "maintenance" => Ok(Self::Maintenance),
            "other" => Ok(Self::Other),
            _ => Err(LedgerError::InvalidCategory(format!("unknown bill type '{s}'"))),
        }
    }
}

impl fmt::Display for BillKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rent => "rent",
            Self::Utilities => "utilities",
            Self::Maintenance => "maintenance",
            Self::Other => "other",
        })
    }
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| LedgerError::InvalidDate(value.to_string()))
}

/// A validated bill request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBill {
    pub kind: BillKind,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

impl NewBill {
    /// The amount must be at least one cent and small enough to charge.
    pub fn new(kind: BillKind, amount: Decimal, due_date: &str) -> Result<Self, LedgerError> {
        minor_units(amount)?;
        Ok(Self {
            kind,
            amount,
            due_date: parse_date(due_date)?,
        })
    }
}

/// Result of applying a payment confirmation to a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BillConfirmation {
    /// Bill moved to paid.
    Paid { on_time: bool },
    /// The same intent was already applied.
    AlreadyPaid,
    /// Bill was settled through a different intent; this is a second charge.
    PaidByOtherIntent,
    /// Event carries an intent this bill never issued.
    IntentMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: BillId,
    pub tenant_id: UserId,
    pub landlord_id: UserId,
    pub kind: BillKind,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    /// Intent of the most recent payment attempt.
    pub payment_intent_id: Option<IntentId>,
    /// Intent that settled the bill.
    pub settled_by: Option<IntentId>,
    #[serde(skip)]
    attempts: Vec<IntentId>,
}

impl Bill {
    pub(crate) fn new(
        id: BillId,
        landlord_id: UserId,
        tenant_id: UserId,
        request: NewBill,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            landlord_id,
            kind: request.kind,
            amount: request.amount,
            due_date: request.due_date,
            created_at: now,
            is_paid: false,
            paid_at: None,
            payment_intent_id: None,
            settled_by: None,
            attempts: Vec::new(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.is_paid,
            self.paid_at.is_some(),
            "Invariant violated: bill {} paid flag and paid date disagree",
            self.id
        );
        debug_assert!(
            self.settled_by
                .as_ref()
                .is_none_or(|intent| self.attempts.contains(intent)),
            "Invariant violated: bill {} settled by an intent it never issued",
            self.id
        );
    }

    pub(crate) fn ensure_payable(&self) -> Result<(), LedgerError> {
        if self.is_paid {
            return Err(LedgerError::InvalidState {
                action: "pay",
                state: "paid",
            });
        }
        Ok(())
    }

    /// Records a new payment attempt. Earlier intents stay valid for confirmation.
    pub(crate) fn begin_payment(&mut self, intent: IntentId) -> Result<(), LedgerError> {
        self.ensure_payable()?;
        self.attempts.push(intent.clone());
        self.payment_intent_id = Some(intent);
        self.assert_invariants();
        Ok(())
    }

    pub fn issued_intent(&self, intent: &IntentId) -> bool {
        self.attempts.contains(intent)
    }

    /// Guarded unpaid → paid transition. Duplicate deliveries are checked first.
    pub(crate) fn confirm_payment(&mut self, intent: &IntentId, now: DateTime<Utc>) -> BillConfirmation {
        if self.is_paid {
            return if self.settled_by.as_ref() == Some(intent) {
                BillConfirmation::AlreadyPaid
            } else if self.issued_intent(intent) {
                BillConfirmation::PaidByOtherIntent
            } else {
                BillConfirmation::IntentMismatch
            };
        }
        if !self.issued_intent(intent) {
            return BillConfirmation::IntentMismatch;
        }

        self.is_paid = true;
        self.paid_at = Some(now);
        self.settled_by = Some(intent.clone());
        self.assert_invariants();

        BillConfirmation::Paid {
            on_time: now.date_naive() <= self.due_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 18, 30, 0).unwrap()
    }

    fn bill() -> Bill {
        let request = NewBill::new(BillKind::Rent, dec!(200), "2025-03-01").unwrap();
        Bill::new(BillId(1), UserId(10), UserId(20), request, at(2025, 2, 1))
    }

    #[test]
    fn new_bill_validates_amount_and_date() {
        assert_eq!(
            NewBill::new(BillKind::Rent, dec!(0), "2025-03-01"),
            Err(LedgerError::InvalidAmount)
        );
        assert_eq!(
            NewBill::new(BillKind::Rent, dec!(10), "March 1st"),
            Err(LedgerError::InvalidDate("March 1st".to_string()))
        );
    }

    #[test]
    fn new_bill_rejects_amounts_that_cannot_be_charged() {
        assert_eq!(
            NewBill::new(BillKind::Other, dec!(0.001), "2025-03-01"),
            Err(LedgerError::InvalidAmount)
        );
        assert_eq!(
            NewBill::new(BillKind::Other, Decimal::MAX, "2025-03-01"),
            Err(LedgerError::InvalidAmount)
        );
        assert!(NewBill::new(BillKind::Other, dec!(0.01), "2025-03-01").is_ok());
    }

    #[test]
    fn bill_kind_parses_case_insensitively() {
        assert_eq!("Utility".parse::<BillKind>().unwrap(), BillKind::Utilities);
        assert!("parking".parse::<BillKind>().is_err());
    }

    #[test]
    fn payment_on_due_date_is_on_time() {
        let mut bill = bill();
        let intent = IntentId::from("pi_1");
        bill.begin_payment(intent.clone()).unwrap();
        assert_eq!(
            bill.confirm_payment(&intent, at(2025, 3, 1)),
            BillConfirmation::Paid { on_time: true }
        );
        assert!(bill.is_paid);
    }

    #[test]
    fn payment_after_due_date_is_late() {
        let mut bill = bill();
        let intent = IntentId::from("pi_1");
        bill.begin_payment(intent.clone()).unwrap();
        assert_eq!(
            bill.confirm_payment(&intent, at(2025, 3, 2)),
            BillConfirmation::Paid { on_time: false }
        );
    }

    #[test]
    fn duplicate_confirmation_keeps_first_paid_date() {
        let mut bill = bill();
        let intent = IntentId::from("pi_1");
        bill.begin_payment(intent.clone()).unwrap();
        bill.confirm_payment(&intent, at(2025, 2, 28));

        assert_eq!(
            bill.confirm_payment(&intent, at(2025, 3, 5)),
            BillConfirmation::AlreadyPaid
        );
        assert_eq!(bill.paid_at, Some(at(2025, 2, 28)));
    }

    #[test]
    fn earlier_attempt_can_settle_and_later_one_is_flagged() {
        let mut bill = bill();
        let first = IntentId::from("pi_1");
        let second = IntentId::from("pi_2");
        bill.begin_payment(first.clone()).unwrap();
        bill.begin_payment(second.clone()).unwrap();

        assert_eq!(
            bill.confirm_payment(&first, at(2025, 2, 20)),
            BillConfirmation::Paid { on_time: true }
        );
        assert_eq!(
            bill.confirm_payment(&second, at(2025, 2, 21)),
            BillConfirmation::PaidByOtherIntent
        );
        assert_eq!(bill.settled_by, Some(first));
    }

    #[test]
    fn unknown_intent_is_mismatch() {
        let mut bill = bill();
        bill.begin_payment(IntentId::from("pi_1")).unwrap();
        assert_eq!(
            bill.confirm_payment(&IntentId::from("pi_x"), at(2025, 2, 20)),
            BillConfirmation::IntentMismatch
        );
        assert!(!bill.is_paid);
    }

    #[test]
    fn paid_bill_cannot_start_new_payment() {
        let mut bill = bill();
        let intent = IntentId::from("pi_1");
        bill.begin_payment(intent.clone()).unwrap();
        bill.confirm_payment(&intent, at(2025, 2, 20));
        assert_eq!(
            bill.begin_payment(IntentId::from("pi_2")),
            Err(LedgerError::InvalidState {
                action: "pay",
                state: "paid"
            })
        );
    }
}
