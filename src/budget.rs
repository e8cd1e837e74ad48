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

//! Spending budgets, expenses and the under-budget streak.
//!
//! Streak evaluation is a pure function of
//! `(today, last_checked_date, total_spent, budget)` applied to a budget row
//! under that row's lock:
//!
//! ```text
//!  checked today ───────────────► no-op
//!  under, not yet awarded ───────► days += 1 (bonus latch at target)
//!  over, days > 0 ───────────────► days = 0
//!  otherwise ────────────────────► mark checked
//! ```

use crate::base::{ExpenseId, UserId};
use crate::error::LedgerError;
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Allowed drift when category percentages are summed.
const PERCENT_TOLERANCE: Decimal = dec!(0.1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Week,
    Month,
    All,
}

impl BudgetPeriod {
    /// First day counted towards this period, or `None` for all time.
    pub fn window_start(self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Week => today.checked_sub_days(Days::new(
                u64::from(today.weekday().num_days_from_monday()),
            )),
            Self::Month => today.with_day(1),
            Self::All => None,
        }
    }
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::All => "all",
        })
    }
}

impl FromStr for BudgetPeriod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            "all" => Ok(Self::All),
            _ => Err(LedgerError::InvalidCategory(format!("unknown budget period '{s}'"))),
        }
    }
}

/// Requested share of a budget for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBudget {
    pub category: String,
    pub percentage: Decimal,
    pub amount: Decimal,
}

/// Splits `amount` across categories.
///
/// # Errors
///
/// - [`LedgerError::InvalidCategory`] - Empty name, duplicate, or percentage outside (0, 100].
/// - [`LedgerError::CategoryTotal`] - Percentages do not sum to 100 ±0.1.
pub fn allocate(amount: Decimal, shares: &[CategoryShare]) -> Result<Vec<CategoryBudget>, LedgerError> {
    if shares.is_empty() {
        return Ok(Vec::new());
    }
    let mut seen = std::collections::HashSet::new();
    for share in shares {
        let name = share.category.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidCategory("category name is empty".to_string()));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(LedgerError::InvalidCategory(format!("duplicate category '{name}'")));
        }
        if share.percentage <= Decimal::ZERO || share.percentage > Decimal::ONE_HUNDRED {
            return Err(LedgerError::InvalidCategory(format!(
                "percentage for '{name}' must be within (0, 100]"
            )));
        }
    }
    let total: Decimal = shares.iter().map(|s| s.percentage).sum();
    if (total - Decimal::ONE_HUNDRED).abs() > PERCENT_TOLERANCE {
        return Err(LedgerError::CategoryTotal(total.normalize().to_string()));
    }
    Ok(shares
        .iter()
        .map(|share| CategoryBudget {
            category: share.category.trim().to_string(),
            percentage: share.percentage,
            amount: (amount * share.percentage / Decimal::ONE_HUNDRED).round_dp(2),
        })
        .collect())
}

/// What a single streak evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StreakOutcome {
    /// No monthly budget exists for the tenant.
    NoBudget,
    /// Already evaluated today.
    AlreadyChecked,
    /// Under budget; counter moved forward.
    Advanced { days_completed: u32 },
    /// Under budget and the target was reached; bonus latched.
    Completed { days_completed: u32 },
    /// Over budget; counter reset.
    Broken,
    /// Checked with no counter change.
    Unchanged { days_completed: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub tenant_id: UserId,
    pub period: BudgetPeriod,
    pub amount: Decimal,
    pub categories: Vec<CategoryBudget>,
    pub days_completed: u32,
    pub last_checked_date: Option<NaiveDate>,
    pub points_awarded: bool,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub(crate) fn new(
        tenant_id: UserId,
        period: BudgetPeriod,
        amount: Decimal,
        shares: &[CategoryShare],
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(Self {
            tenant_id,
            period,
            amount,
            categories: allocate(amount, shares)?,
            days_completed: 0,
            last_checked_date: None,
            points_awarded: false,
            updated_at: now,
        })
    }

    /// Changes amount and categories. Streak counters and the bonus latch stay.
    pub(crate) fn reconfigure(
        &mut self,
        amount: Decimal,
        shares: &[CategoryShare],
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.categories = allocate(amount, shares)?;
        self.amount = amount;
        self.updated_at = now;
        Ok(())
    }

    /// Advances or resets the streak for `today`.
    pub(crate) fn evaluate_streak(
        &mut self,
        today: NaiveDate,
        total_spent: Decimal,
        target_days: u32,
    ) -> StreakOutcome {
        if self.last_checked_date == Some(today) {
            return StreakOutcome::AlreadyChecked;
        }
        let under_budget = total_spent <= self.amount;
        self.last_checked_date = Some(today);

        let outcome = if under_budget && !self.points_awarded {
            self.days_completed = (self.days_completed + 1).min(target_days);
            if self.days_completed >= target_days {
                self.points_awarded = true;
                StreakOutcome::Completed {
                    days_completed: self.days_completed,
                }
            } else {
                StreakOutcome::Advanced {
                    days_completed: self.days_completed,
                }
            }
        } else if !under_budget && self.days_completed > 0 {
            self.days_completed = 0;
            StreakOutcome::Broken
        } else {
            StreakOutcome::Unchanged {
                days_completed: self.days_completed,
            }
        };

        debug_assert!(
            self.days_completed <= target_days,
            "Invariant violated: streak counter {} above target {}",
            self.days_completed,
            target_days
        );
        outcome
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: ExpenseId,
    pub tenant_id: UserId,
    pub amount: Decimal,
    pub category: String,
    pub date: NaiveDate,
}

/// Sum of expenses dated on or after `since` (everything when `None`).
pub fn total_spent<'a>(expenses: impl IntoIterator<Item = &'a Expense>, since: Option<NaiveDate>) -> Decimal {
    expenses
        .into_iter()
        .filter(|e| since.is_none_or(|start| e.date >= start))
        .map(|e| e.amount)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProgress {
    pub category: String,
    pub allotted: Decimal,
    pub spent: Decimal,
}

/// Spend against a budget for the period containing `as_of`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetProgress {
    pub period: BudgetPeriod,
    pub as_of: NaiveDate,
    pub amount: Decimal,
    pub spent: Decimal,
    pub remaining: Decimal,
    pub percent_used: Decimal,
    pub under_budget: bool,
    pub days_completed: u32,
    pub target_days: u32,
    pub points_awarded: bool,
    pub categories: Vec<CategoryProgress>,
}

impl BudgetProgress {
    pub(crate) fn compute(budget: &Budget, expenses: &[Expense], as_of: NaiveDate, target_days: u32) -> Self {
        let since = budget.period.window_start(as_of);
        let in_window: Vec<&Expense> = expenses
            .iter()
            .filter(|e| e.date <= as_of && since.is_none_or(|start| e.date >= start))
            .collect();
        let spent = total_spent(in_window.iter().copied(), None);
        let categories = budget
            .categories
            .iter()
            .map(|c| CategoryProgress {
                category: c.category.clone(),
                allotted: c.amount,
                spent: in_window
                    .iter()
                    .filter(|e| e.category.eq_ignore_ascii_case(&c.category))
                    .map(|e| e.amount)
                    .sum(),
            })
            .collect();
        Self {
            period: budget.period,
            as_of,
            amount: budget.amount,
            spent,
            remaining: budget.amount - spent,
            percent_used: (spent * Decimal::ONE_HUNDRED / budget.amount).round_dp(1),
            under_budget: spent <= budget.amount,
            days_completed: budget.days_completed,
            target_days,
            points_awarded: budget.points_awarded,
            categories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn monthly(amount: Decimal) -> Budget {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        Budget::new(UserId(1), BudgetPeriod::Month, amount, &[], now).unwrap()
    }

    fn share(category: &str, percentage: Decimal) -> CategoryShare {
        CategoryShare {
            category: category.to_string(),
            percentage,
        }
    }

    #[test]
    fn allocate_splits_amount() {
        let cats = allocate(dec!(2000), &[share("food", dec!(40)), share("rent", dec!(60))]).unwrap();
        assert_eq!(cats[0].amount, dec!(800));
        assert_eq!(cats[1].amount, dec!(1200));
    }

    #[test]
    fn allocate_accepts_rounding_tolerance() {
        let shares = [
            share("a", dec!(33.33)),
            share("b", dec!(33.33)),
            share("c", dec!(33.33)),
        ];
        assert!(allocate(dec!(900), &shares).is_ok());
    }

    #[test]
    fn allocate_rejects_bad_total() {
        let result = allocate(dec!(1000), &[share("food", dec!(50)), share("fun", dec!(40))]);
        assert_eq!(result, Err(LedgerError::CategoryTotal("90".to_string())));
    }

    #[test]
    fn allocate_rejects_duplicates() {
        let result = allocate(dec!(1000), &[share("Food", dec!(50)), share("food", dec!(50))]);
        assert!(matches!(result, Err(LedgerError::InvalidCategory(_))));
    }

    #[test]
    fn streak_advances_once_per_day() {
        let mut budget = monthly(dec!(2000));
        assert_eq!(
            budget.evaluate_streak(day(2), dec!(100), 30),
            StreakOutcome::Advanced { days_completed: 1 }
        );
        assert_eq!(
            budget.evaluate_streak(day(2), dec!(100), 30),
            StreakOutcome::AlreadyChecked
        );
        assert_eq!(budget.days_completed, 1);
    }

    #[test]
    fn overspend_resets_counter_but_not_latch() {
        let mut budget = monthly(dec!(2000));
        budget.evaluate_streak(day(2), dec!(100), 30);
        budget.evaluate_streak(day(3), dec!(100), 30);
        assert_eq!(
            budget.evaluate_streak(day(4), dec!(2100), 30),
            StreakOutcome::Broken
        );
        assert_eq!(budget.days_completed, 0);
        assert!(!budget.points_awarded);
    }

    #[test]
    fn overspend_with_no_streak_is_unchanged() {
        let mut budget = monthly(dec!(2000));
        assert_eq!(
            budget.evaluate_streak(day(2), dec!(2100), 30),
            StreakOutcome::Unchanged { days_completed: 0 }
        );
        assert_eq!(budget.last_checked_date, Some(day(2)));
    }

    #[test]
    fn spending_exactly_the_budget_counts_as_under() {
        let mut budget = monthly(dec!(2000));
        assert_eq!(
            budget.evaluate_streak(day(2), dec!(2000), 30),
            StreakOutcome::Advanced { days_completed: 1 }
        );
    }

    #[test]
    fn reaching_target_latches_once() {
        let mut budget = monthly(dec!(2000));
        budget.days_completed = 29;
        assert_eq!(
            budget.evaluate_streak(day(2), dec!(0), 30),
            StreakOutcome::Completed { days_completed: 30 }
        );
        assert!(budget.points_awarded);

        // Latched: further under-budget days do not count.
        assert_eq!(
            budget.evaluate_streak(day(3), dec!(0), 30),
            StreakOutcome::Unchanged { days_completed: 30 }
        );
        budget.evaluate_streak(day(4), dec!(5000), 30);
        assert_eq!(budget.days_completed, 0);
        assert!(budget.points_awarded);
    }

    #[test]
    fn reconfigure_keeps_streak_state() {
        let now = Utc.with_ymd_and_hms(2025, 3, 5, 8, 0, 0).unwrap();
        let mut budget = monthly(dec!(2000));
        budget.evaluate_streak(day(2), dec!(0), 30);
        budget.reconfigure(dec!(2500), &[share("food", dec!(100))], now).unwrap();
        assert_eq!(budget.days_completed, 1);
        assert_eq!(budget.amount, dec!(2500));
        assert_eq!(budget.categories[0].amount, dec!(2500));
    }

    #[test]
    fn window_start_per_period() {
        // 2025-03-12 is a Wednesday.
        let today = day(12);
        assert_eq!(BudgetPeriod::Month.window_start(today), Some(day(1)));
        assert_eq!(BudgetPeriod::Week.window_start(today), Some(day(10)));
        assert_eq!(BudgetPeriod::All.window_start(today), None);
    }

    #[test]
    fn progress_counts_current_window_by_category() {
        let mut budget = monthly(dec!(1000));
        budget.categories = allocate(dec!(1000), &[share("food", dec!(50)), share("fun", dec!(50))]).unwrap();
        let expense = |id, amount, category: &str, date| Expense {
            id: ExpenseId(id),
            tenant_id: UserId(1),
            amount,
            category: category.to_string(),
            date,
        };
        let expenses = vec![
            expense(1, dec!(300), "food", day(3)),
            expense(2, dec!(50), "Fun", day(4)),
            expense(3, dec!(999), "food", NaiveDate::from_ymd_opt(2025, 2, 27).unwrap()),
        ];

        let progress = BudgetProgress::compute(&budget, &expenses, day(10), 30);
        assert_eq!(progress.spent, dec!(350));
        assert_eq!(progress.remaining, dec!(650));
        assert_eq!(progress.percent_used, dec!(35.0));
        assert!(progress.under_budget);
        assert_eq!(progress.categories[0].spent, dec!(300));
        assert_eq!(progress.categories[1].spent, dec!(50));
    }
}
