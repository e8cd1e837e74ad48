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

//! Reward accrual and points redemption.
//!
//! Every tenant owns one [`PointsAccount`]. It is the only place the points
//! balance changes, and every change is paired with an append-only row:
//!
//! ```text
//!  balance == Σ rewards.points_earned − Σ redemptions.points_spent
//! ```
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use rent_ledger::reward::points_for_payment;
//!
//! assert_eq!(points_for_payment(dec!(200), true, 10), 20);
//! assert_eq!(points_for_payment(dec!(200), false, 10), 0);
//! ```

use crate::base::{BillId, RedemptionId, RequestId, RewardId, UserId};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::collections::HashMap;

/// Points for a confirmed bill payment. Late payments earn nothing, and so
/// does an amount too large to scale.
pub fn points_for_payment(amount: Decimal, on_time: bool, percent: u32) -> u64 {
    if !on_time || amount <= Decimal::ZERO {
        return 0;
    }
    amount
        .checked_mul(Decimal::from(percent))
        .map(|scaled| scaled / Decimal::ONE_HUNDRED)
        .and_then(|points| {
            points
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_u64()
        })
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    OnTimePayment,
    BudgetStreak,
}

/// Immutable record of points granted for one qualifying event.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: RewardId,
    pub tenant_id: UserId,
    pub bill_id: Option<BillId>,
    pub kind: RewardKind,
    /// Bill amount or budget amount the points were computed from.
    pub amount: Decimal,
    pub is_on_time: bool,
    pub points_earned: u64,
    pub earned_at: DateTime<Utc>,
}

/// What a reward is being granted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grant {
    Payment { bill_id: BillId, amount: Decimal, points: u64 },
    Streak { budget_amount: Decimal, points: u64 },
}

impl Grant {
    fn points(&self) -> u64 {
        match self {
            Grant::Payment { points, .. } | Grant::Streak { points, .. } => *points,
        }
    }
}

/// Catalog entry being redeemed. The catalog itself lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopItem {
    pub id: String,
    pub name: String,
    pub cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: RedemptionId,
    pub tenant_id: UserId,
    pub item_id: String,
    pub item_name: String,
    pub points_spent: u64,
    pub redeemed_at: DateTime<Utc>,
    pub request_id: RequestId,
}

/// Outcome of a redemption request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionReceipt {
    pub redemption: Redemption,
    pub balance: u64,
    /// True when the request id had already been applied.
    pub replayed: bool,
}

/// Snapshot of the ledger totals for one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub balance: u64,
    pub earned: u64,
    pub spent: u64,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.earned.checked_sub(self.spent) == Some(self.balance)
    }
}

#[derive(Debug)]
struct PointsData {
    tenant_id: UserId,
    balance: u64,
    rewards: Vec<Reward>,
    redemptions: Vec<Redemption>,
    /// Redemption requests already applied, by position in `redemptions`.
    requests: HashMap<RequestId, usize>,
}

impl PointsData {
    fn new(tenant_id: UserId) -> Self {
        Self {
            tenant_id,
            balance: 0,
            rewards: Vec::new(),
            redemptions: Vec::new(),
            requests: HashMap::new(),
        }
    }

    fn reconciliation(&self) -> Reconciliation {
        Reconciliation {
            balance: self.balance,
            earned: self.rewards.iter().map(|r| r.points_earned).sum(),
            spent: self.redemptions.iter().map(|r| r.points_spent).sum(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.reconciliation().is_consistent(),
            "Invariant violated: tenant {} balance {} does not match ledger {:?}",
            self.tenant_id,
            self.balance,
            self.reconciliation()
        );
    }
}

/// A tenant's points balance and the rows that justify it.
#[derive(Debug)]
pub struct PointsAccount {
    inner: Mutex<PointsData>,
}

impl PointsAccount {
    pub fn new(tenant_id: UserId) -> Self {
        Self {
            inner: Mutex::new(PointsData::new(tenant_id)),
        }
    }

    pub fn balance(&self) -> u64 {
        self.inner.lock().balance
    }

    pub fn rewards(&self) -> Vec<Reward> {
        self.inner.lock().rewards.clone()
    }

    pub fn redemptions(&self) -> Vec<Redemption> {
        self.inner.lock().redemptions.clone()
    }

    pub fn reconciliation(&self) -> Reconciliation {
        self.inner.lock().reconciliation()
    }

    /// Appends a reward and credits its points in one critical section.
    ///
    /// Returns `None` for zero-point grants, which leave no row behind.
    pub(crate) fn accrue(&self, id: RewardId, grant: Grant, now: DateTime<Utc>) -> Option<Reward> {
        let points = grant.points();
        if points == 0 {
            return None;
        }
        let mut data = self.inner.lock();
        let (bill_id, kind, amount) = match grant {
            Grant::Payment { bill_id, amount, .. } => {
                (Some(bill_id), RewardKind::OnTimePayment, amount)
            }
            Grant::Streak { budget_amount, .. } => (None, RewardKind::BudgetStreak, budget_amount),
        };
        let reward = Reward {
            id,
            tenant_id: data.tenant_id,
            bill_id,
            kind,
            amount,
            is_on_time: true,
            points_earned: points,
            earned_at: now,
        };
        data.balance = data.balance.saturating_add(points);
        data.rewards.push(reward.clone());
        data.assert_invariants();
        Some(reward)
    }

    /// Debits the item cost and records the redemption in one critical section.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientPoints`] - Balance is below the item cost.
    pub(crate) fn redeem(
        &self,
        id: RedemptionId,
        item: &ShopItem,
        request_id: RequestId,
        now: DateTime<Utc>,
    ) -> Result<RedemptionReceipt, LedgerError> {
        let mut data = self.inner.lock();

        if let Some(&index) = data.requests.get(&request_id) {
            return Ok(RedemptionReceipt {
                redemption: data.redemptions[index].clone(),
                balance: data.balance,
                replayed: true,
            });
        }

        let remaining = data
            .balance
            .checked_sub(item.cost)
            .ok_or(LedgerError::InsufficientPoints {
                balance: data.balance,
                requested: item.cost,
            })?;

        let redemption = Redemption {
            id,
            tenant_id: data.tenant_id,
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            points_spent: item.cost,
            redeemed_at: now,
            request_id: request_id.clone(),
        };
        data.balance = remaining;
        data.redemptions.push(redemption.clone());
        let index = data.redemptions.len() - 1;
        data.requests.insert(request_id, index);
        data.assert_invariants();

        Ok(RedemptionReceipt {
            redemption,
            balance: remaining,
            replayed: false,
        })
    }
}

impl Serialize for PointsAccount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let totals = data.reconciliation();
        let mut state = serializer.serialize_struct("PointsAccount", 4)?;
        state.serialize_field("tenant", &data.tenant_id)?;
        state.serialize_field("points", &data.balance)?;
        state.serialize_field("earned", &totals.earned)?;
        state.serialize_field("spent", &totals.spent)?;
        state.end()
    }
}
