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

//! Budgets, expenses and the daily streak evaluation.

use super::Engine;
use crate::base::{ExpenseId, RewardId, UserId};
use crate::budget::{Budget, BudgetPeriod, BudgetProgress, CategoryShare, Expense, StreakOutcome, total_spent};
use crate::error::LedgerError;
use crate::reward::Grant;
use crate::user::Role;
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

impl Engine {
    /// Creates or reconfigures the tenant's budget for `period`.
    ///
    /// Reconfiguring keeps the streak counter and the one-shot bonus latch.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Amount not positive.
    /// - [`LedgerError::CategoryTotal`] / [`LedgerError::InvalidCategory`] - Bad category split.
    pub fn set_budget(
        &self,
        tenant_id: UserId,
        period: BudgetPeriod,
        amount: Decimal,
        categories: &[CategoryShare],
    ) -> Result<Budget, LedgerError> {
        self.require_role(tenant_id, Role::Tenant)?;
        let now = self.clock.now();

        let existing = match self.budgets.entry((tenant_id, period)) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let budget = Budget::new(tenant_id, period, amount, categories, now)?;
                entry.insert(Arc::new(Mutex::new(budget.clone())));
                info!(%tenant_id, %period, %amount, "budget created");
                return Ok(budget);
            }
        };

        let mut budget = existing.lock();
        budget.reconfigure(amount, categories, now)?;
        info!(%tenant_id, %period, %amount, "budget updated");
        Ok(budget.clone())
    }

    /// # Errors
    ///
    /// - [`LedgerError::BudgetNotFound`] - No budget for this period.
    pub fn budget(&self, tenant_id: UserId, period: BudgetPeriod) -> Result<Budget, LedgerError> {
        self.require_role(tenant_id, Role::Tenant)?;
        Ok(self.budget_ref(tenant_id, period)?.lock().clone())
    }

    pub fn record_expense(
        &self,
        tenant_id: UserId,
        amount: Decimal,
        category: &str,
        date: NaiveDate,
    ) -> Result<ExpenseId, LedgerError> {
        self.require_role(tenant_id, Role::Tenant)?;
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let category = category.trim();
        if category.is_empty() {
            return Err(LedgerError::InvalidCategory("category name is empty".to_string()));
        }
        let id = ExpenseId(self.ids.expenses.next());
        self.expense_ref(tenant_id).lock().push(Expense {
            id,
            tenant_id,
            amount,
            category: category.to_string(),
            date,
        });
        debug!(%tenant_id, expense_id = %id, %amount, category, %date, "expense recorded");
        Ok(id)
    }

    pub fn expenses(&self, tenant_id: UserId) -> Vec<Expense> {
        self.expenses
            .get(&tenant_id)
            .map(|e| e.lock().clone())
            .unwrap_or_default()
    }

    /// Advances or resets the tenant's monthly under-budget streak for today.
    ///
    /// Idempotent per calendar day. The check-and-update and the streak bonus
    /// run under the budget row lock, so concurrent calls for one tenant
    /// serialize and only the first call of the day counts.
    pub fn evaluate_streak(&self, tenant_id: UserId) -> Result<StreakOutcome, LedgerError> {
        self.require_role(tenant_id, Role::Tenant)?;
        let Ok(budget_ref) = self.budget_ref(tenant_id, BudgetPeriod::Month) else {
            return Ok(StreakOutcome::NoBudget);
        };

        let now = self.clock.now();
        let today = now.date_naive();
        let mut budget = budget_ref.lock();
        let spent = {
            let expenses = self.expense_ref(tenant_id);
            let expenses = expenses.lock();
            total_spent(expenses.iter(), BudgetPeriod::Month.window_start(today))
        };

        let outcome = budget.evaluate_streak(today, spent, self.rewards.streak_target_days);
        match outcome {
            StreakOutcome::Completed { days_completed } => {
                let grant = Grant::Streak {
                    budget_amount: budget.amount,
                    points: self.rewards.streak_bonus_points,
                };
                self.points_account(tenant_id)
                    .accrue(RewardId(self.ids.rewards.next()), grant, now);
                info!(%tenant_id, days_completed, bonus = self.rewards.streak_bonus_points, "budget streak completed");
            }
            StreakOutcome::Broken => info!(%tenant_id, %spent, budget = %budget.amount, "budget streak broken"),
            StreakOutcome::AlreadyChecked => debug!(%tenant_id, %today, "streak already evaluated today"),
            _ => debug!(%tenant_id, ?outcome, %spent, "streak evaluated"),
        }
        Ok(outcome)
    }

    /// Spend against the budget for the period containing today.
    pub fn budget_progress(
        &self,
        tenant_id: UserId,
        period: BudgetPeriod,
    ) -> Result<BudgetProgress, LedgerError> {
        let budget = self.budget(tenant_id, period)?;
        let expenses = self.expenses(tenant_id);
        Ok(BudgetProgress::compute(
            &budget,
            &expenses,
            self.clock.today(),
            self.rewards.streak_target_days,
        ))
    }

    fn budget_ref(&self, tenant_id: UserId, period: BudgetPeriod) -> Result<Arc<Mutex<Budget>>, LedgerError> {
        self.budgets
            .get(&(tenant_id, period))
            .map(|b| Arc::clone(&b))
            .ok_or(LedgerError::BudgetNotFound(period))
    }

    fn expense_ref(&self, tenant_id: UserId) -> Arc<Mutex<Vec<Expense>>> {
        Arc::clone(&self.expenses.entry(tenant_id).or_default())
    }
}
