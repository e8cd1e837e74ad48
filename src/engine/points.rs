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

//! Points balance, rewards and redemptions.

use super::Engine;
use crate::base::{RedemptionId, RequestId, UserId};
use crate::error::LedgerError;
use crate::reward::{Reconciliation, Redemption, RedemptionReceipt, Reward, ShopItem};
use crate::user::Role;
use serde::Serialize;
use tracing::info;

/// One row of the per-tenant points report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantStatement {
    pub tenant: UserId,
    pub landlord: Option<UserId>,
    pub points: u64,
    pub rewards: usize,
    pub redemptions: usize,
    pub reconciled: bool,
}

impl Engine {
    /// # Errors
    ///
    /// - [`LedgerError::UserNotFound`] / [`LedgerError::RoleMismatch`] - Not a tenant.
    pub fn points_balance(&self, tenant_id: UserId) -> Result<u64, LedgerError> {
        self.require_role(tenant_id, Role::Tenant)?;
        Ok(self.points_account(tenant_id).balance())
    }

    pub fn rewards(&self, tenant_id: UserId) -> Result<Vec<Reward>, LedgerError> {
        self.require_role(tenant_id, Role::Tenant)?;
        Ok(self.points_account(tenant_id).rewards())
    }

    pub fn redemptions(&self, tenant_id: UserId) -> Result<Vec<Redemption>, LedgerError> {
        self.require_role(tenant_id, Role::Tenant)?;
        Ok(self.points_account(tenant_id).redemptions())
    }

    /// Spends points on a shop item. Retrying with the same `request_id`
    /// returns the original redemption without debiting again.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Item cost is zero.
    /// - [`LedgerError::InsufficientPoints`] - Balance is below the cost; nothing changes.
    pub fn redeem(
        &self,
        tenant_id: UserId,
        item: &ShopItem,
        request_id: RequestId,
    ) -> Result<RedemptionReceipt, LedgerError> {
        self.require_role(tenant_id, Role::Tenant)?;
        if item.cost == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let receipt = self.points_account(tenant_id).redeem(
            RedemptionId(self.ids.redemptions.next()),
            item,
            request_id,
            self.clock.now(),
        )?;
        if !receipt.replayed {
            info!(%tenant_id, item = %item.id, cost = item.cost, balance = receipt.balance, "points redeemed");
        }
        Ok(receipt)
    }

    /// Ledger totals for one tenant; `is_consistent()` must always hold.
    pub fn reconcile(&self, tenant_id: UserId) -> Result<Reconciliation, LedgerError> {
        self.require_role(tenant_id, Role::Tenant)?;
        Ok(self.points_account(tenant_id).reconciliation())
    }

    /// Points report for every tenant, ordered by id.
    pub fn tenant_statements(&self) -> Vec<TenantStatement> {
        let mut tenants: Vec<(UserId, Option<UserId>)> = self
            .users
            .iter()
            .filter(|u| u.role == Role::Tenant)
            .map(|u| (u.id, u.landlord_id))
            .collect();
        tenants.sort_by_key(|(id, _)| *id);

        tenants
            .into_iter()
            .map(|(tenant, landlord)| {
                let account = self.points_account(tenant);
                let totals = account.reconciliation();
                TenantStatement {
                    tenant,
                    landlord,
                    points: totals.balance,
                    rewards: account.rewards().len(),
                    redemptions: account.redemptions().len(),
                    reconciled: totals.is_consistent(),
                }
            })
            .collect()
    }
}
