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

//! The financial lifecycle engine.
//!
//! [`Engine`] owns every ledger record and is the only way to change them.
//! State lives in concurrent maps keyed by id; each plan, bill, budget and
//! points account carries its own lock, so there is no global lock and no
//! contention between tenants.
//!
//! Lock order, outermost first: plan / bill / budget → user record → points
//! account. Nothing acquires them in the other direction.

mod bills;
mod budgets;
mod plans;
mod points;
mod webhooks;

pub use points::TenantStatement;

use crate::base::{BillId, PlanId, Sequence, UserId};
use crate::bill::Bill;
use crate::budget::{Budget, BudgetPeriod, Expense};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError, RewardConfig};
use crate::delivery_log::DeliveryLog;
use crate::error::LedgerError;
use crate::gateway::{DisabledSigning, HostedCheckout, HostedSigning, PaymentGateway, SignatureService};
use crate::reconciliation::AnomalyQueue;
use crate::rent_plan::RentPlan;
use crate::reward::PointsAccount;
use crate::user::{Role, User};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct Ids {
    users: Sequence,
    plans: Sequence,
    bills: Sequence,
    rewards: Sequence,
    redemptions: Sequence,
    expenses: Sequence,
}

impl Ids {
    fn new() -> Self {
        Self {
            users: Sequence::new(),
            plans: Sequence::new(),
            bills: Sequence::new(),
            rewards: Sequence::new(),
            redemptions: Sequence::new(),
            expenses: Sequence::new(),
        }
    }
}

pub struct Engine {
    rewards: RewardConfig,
    gateway: Arc<dyn PaymentGateway>,
    signer: Arc<dyn SignatureService>,
    clock: Arc<dyn Clock>,
    ids: Ids,
    users: DashMap<UserId, User>,
    /// Points accounts, one per tenant.
    points: DashMap<UserId, Arc<PointsAccount>>,
    plans: DashMap<PlanId, Arc<Mutex<RentPlan>>>,
    /// Signing submission id → plan.
    submissions: DashMap<String, PlanId>,
    bills: DashMap<BillId, Arc<Mutex<Bill>>>,
    budgets: DashMap<(UserId, BudgetPeriod), Arc<Mutex<Budget>>>,
    expenses: DashMap<UserId, Arc<Mutex<Vec<Expense>>>>,
    deliveries: DeliveryLog,
    anomalies: AnomalyQueue,
}

/// Wires collaborators into an [`Engine`].
pub struct EngineBuilder {
    config: Config,
    gateway: Option<Arc<dyn PaymentGateway>>,
    signer: Option<Arc<dyn SignatureService>>,
    clock: Option<Arc<dyn Clock>>,
}

impl EngineBuilder {
    /// Uses `config` as given. Run [`Config::validate`] first, or build
    /// through [`Engine::from_config`], when it comes from outside.
    pub fn config(mut self, config: &Config) -> Self {
        self.config = config.clone();
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn SignatureService>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Unset collaborators fall back to the hosted adapters and the system clock.
    pub fn build(self) -> Engine {
        let config = self.config;
        let gateway = self.gateway.unwrap_or_else(|| {
            Arc::new(HostedCheckout::new(
                config.gateway.checkout_base_url.clone(),
                config.gateway.currency.clone(),
            ))
        });
        let signer = self.signer.unwrap_or_else(|| {
            if config.signing.enabled {
                Arc::new(HostedSigning::new(config.signing.signing_base_url.clone()))
            } else {
                Arc::new(DisabledSigning)
            }
        });
        Engine {
            rewards: config.rewards.clone(),
            gateway,
            signer,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            ids: Ids::new(),
            users: DashMap::new(),
            points: DashMap::new(),
            plans: DashMap::new(),
            submissions: DashMap::new(),
            bills: DashMap::new(),
            budgets: DashMap::new(),
            expenses: DashMap::new(),
            deliveries: DeliveryLog::new(),
            anomalies: AnomalyQueue::new(),
        }
    }
}

impl Engine {
    /// Creates an engine with default configuration and hosted adapters.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder {
            config: Config::default(),
            gateway: None,
            signer: None,
            clock: None,
        }
    }

    /// Builds an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Invalid`] - A reward or gateway setting is out of range.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::builder().config(config).build())
    }

    pub fn reward_config(&self) -> &RewardConfig {
        &self.rewards
    }

    /// Registers a tenant or landlord. Tenants get an empty points account.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidInput`] - Empty name or malformed email.
    pub fn register_user(
        &self,
        role: Role,
        name: &str,
        email: &str,
    ) -> Result<UserId, LedgerError> {
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(LedgerError::InvalidInput(format!("invalid email '{email}'")));
        }
        let id = UserId(self.ids.users.next());
        self.users.insert(id, User::new(id, role, name.trim(), email.trim()));
        if role == Role::Tenant {
            self.points.insert(id, Arc::new(PointsAccount::new(id)));
        }
        tracing::info!(user_id = %id, %role, "user registered");
        Ok(id)
    }

    pub fn user(&self, id: &UserId) -> Option<User> {
        self.users.get(id).map(|u| u.clone())
    }

    /// Tenants linked to `landlord_id`, ordered by id.
    pub fn tenants_of(&self, landlord_id: UserId) -> Vec<User> {
        let mut tenants: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.role == Role::Tenant && u.landlord_id == Some(landlord_id))
            .map(|u| u.clone())
            .collect();
        tenants.sort_by_key(|u| u.id);
        tenants
    }

    /// Delivery history of payment events.
    pub fn deliveries(&self) -> &DeliveryLog {
        &self.deliveries
    }

    /// Anomalies awaiting operator follow-up.
    pub fn anomalies(&self) -> &AnomalyQueue {
        &self.anomalies
    }

    fn require_role(&self, id: UserId, role: Role) -> Result<User, LedgerError> {
        let user = self.user(&id).ok_or(LedgerError::UserNotFound(id))?;
        if user.role != role {
            return Err(LedgerError::RoleMismatch(id));
        }
        Ok(user)
    }

    /// Links a tenant to a landlord unless already linked.
    fn link_landlord(&self, tenant_id: UserId, landlord_id: UserId) {
        if let Some(mut tenant) = self.users.get_mut(&tenant_id) {
            if tenant.link_landlord(landlord_id) {
                tracing::info!(%tenant_id, %landlord_id, "tenant linked to landlord");
            }
        }
    }

    fn points_account(&self, tenant_id: UserId) -> Arc<PointsAccount> {
        Arc::clone(
            &self
                .points
                .entry(tenant_id)
                .or_insert_with(|| Arc::new(PointsAccount::new(tenant_id))),
        )
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
