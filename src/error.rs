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

//! Error types for the financial lifecycle core.

use crate::gateway::GatewayError;
use thiserror::Error;

/// Errors returned synchronously to the caller of a ledger operation.
///
/// Webhook reconciliation never surfaces these to the payment processor;
/// see [`crate::WebhookOutcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Lease terms failed validation
    #[error("invalid terms: {0}")]
    InvalidTerms(&'static str),

    /// Date field could not be parsed as YYYY-MM-DD
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    /// Category percentages do not add up to 100
    #[error("category percentages must sum to 100 (got {0})")]
    CategoryTotal(String),

    /// Free-form field failed validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Category entry is malformed
    #[error("invalid category: {0}")]
    InvalidCategory(String),

    /// Requester has the wrong role for this operation
    #[error("user {0} does not have the required role")]
    RoleMismatch(crate::UserId),

    /// Requester is not a party to the plan or bill
    #[error("user {0} is not permitted to act on this record")]
    NotOwner(crate::UserId),

    /// Landlord has no established relationship with the tenant
    #[error("landlord is not the tenant's current landlord")]
    NotCurrentLandlord,

    #[error("user {0} not found")]
    UserNotFound(crate::UserId),

    #[error("rent plan {0} not found")]
    PlanNotFound(crate::PlanId),

    #[error("bill {0} not found")]
    BillNotFound(crate::BillId),

    #[error("no {0} budget configured")]
    BudgetNotFound(crate::BudgetPeriod),

    /// Operation is illegal for the record's current state
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    /// Redemption exceeds the points balance
    #[error("insufficient points: balance {balance}, requested {requested}")]
    InsufficientPoints { balance: u64, requested: u64 },

    /// External payment or signature service failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Coarse classification used by API layers to pick a response and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    InvalidState,
    Gateway,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount
            | Self::InvalidTerms(_)
            | Self::InvalidDate(_)
            | Self::CategoryTotal(_)
            | Self::InvalidInput(_)
            | Self::InvalidCategory(_) => ErrorKind::Validation,
            Self::RoleMismatch(_) | Self::NotOwner(_) | Self::NotCurrentLandlord => {
                ErrorKind::Authorization
            }
            Self::UserNotFound(_)
            | Self::PlanNotFound(_)
            | Self::BillNotFound(_)
            | Self::BudgetNotFound(_) => ErrorKind::NotFound,
            Self::InvalidState { .. } | Self::InsufficientPoints { .. } => ErrorKind::InvalidState,
            Self::Gateway(_) => ErrorKind::Gateway,
        }
    }

    /// Only collaborator failures are worth retrying, and only for the initiating action.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Gateway
    }
}
