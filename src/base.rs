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

//! Core identifier types for users, ledger entities and external handles.

use crate::error::LedgerError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Unique identifier for a tenant or landlord.
    UserId
);
numeric_id!(
    /// Unique identifier for a rent plan proposal.
    PlanId
);
numeric_id!(
    /// Unique identifier for a bill.
    BillId
);
numeric_id!(
    /// Unique identifier for a reward row.
    RewardId
);
numeric_id!(
    /// Unique identifier for a redemption row.
    RedemptionId
);
numeric_id!(
    /// Unique identifier for a recorded expense.
    ExpenseId
);

/// Payment processor handle for a single checkout attempt.
///
/// Assigned by the gateway; used as the idempotency key for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct IntentId(pub String);

impl IntentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IntentId {
    fn from(value: &str) -> Self {
        IntentId(value.to_string())
    }
}

/// Client-supplied key that makes a redemption request safe to retry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId(value.to_string())
    }
}

/// Monotonic id source. Starts at 1 so that 0 never names a live row.
#[derive(Debug)]
pub(crate) struct Sequence(AtomicU64);

impl Sequence {
    pub(crate) fn new() -> Self {
        Sequence(AtomicU64::new(1))
    }

    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Converts a currency amount to whole minor units (cents) for the gateway.
///
/// Fails for amounts that round to less than one cent or do not fit an `i64`
/// once scaled, so plans and bills are checked with it at creation.
pub(crate) fn minor_units(amount: Decimal) -> Result<i64, LedgerError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or(LedgerError::InvalidAmount)?
        .round_dp(0)
        .to_i64()
        .filter(|units| *units > 0)
        .ok_or(LedgerError::InvalidAmount)
}
