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

//! Contracts for the external payment processor and e-signature provider.
//!
//! The core only depends on the traits here. [`HostedCheckout`] and
//! [`HostedSigning`] are the adapters used by the replay CLI and local
//! development; production deployments plug in their own implementations.

use crate::base::{BillId, IntentId, PlanId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by an external collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Collaborator could not be reached or timed out
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// Collaborator refused the request
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

/// Metadata attached to a payment intent and echoed back on completion.
///
/// Exactly one of `plan_id` / `bill_id` is set; it decides which state
/// machine the confirmation is routed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bill_id: Option<BillId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landlord_id: Option<UserId>,
}

impl IntentMetadata {
    pub fn for_plan(plan_id: PlanId, tenant_id: UserId, landlord_id: UserId) -> Self {
        Self {
            plan_id: Some(plan_id),
            bill_id: None,
            tenant_id: Some(tenant_id),
            landlord_id: Some(landlord_id),
        }
    }

    pub fn for_bill(bill_id: BillId, tenant_id: UserId, landlord_id: UserId) -> Self {
        Self {
            plan_id: None,
            bill_id: Some(bill_id),
            tenant_id: Some(tenant_id),
            landlord_id: Some(landlord_id),
        }
    }
}

/// Handle returned to the tenant to finish payment out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutIntent {
    pub intent_id: IntentId,
    pub redirect_url: String,
}

/// Payment processor used to open checkout sessions.
pub trait PaymentGateway: Send + Sync {
    fn create_intent(
        &self,
        amount_minor_units: i64,
        purpose: &str,
        metadata: &IntentMetadata,
    ) -> Result<CheckoutIntent, GatewayError>;
}

/// Submission created by the e-signature provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequest {
    pub submission_id: String,
    pub signing_url: String,
}

/// E-signature provider. Best-effort: failures never gate the lease.
pub trait SignatureService: Send + Sync {
    fn send_for_signature(
        &self,
        document: &[u8],
        signer_email: &str,
        signer_name: &str,
    ) -> Result<SigningRequest, GatewayError>;
}

/// Hosted checkout page adapter.
#[derive(Debug, Clone)]
pub struct HostedCheckout {
    base_url: String,
    currency: String,
}

impl HostedCheckout {
    pub fn new(base_url: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            currency: currency.into(),
        }
    }
}

impl PaymentGateway for HostedCheckout {
    fn create_intent(
        &self,
        amount_minor_units: i64,
        purpose: &str,
        metadata: &IntentMetadata,
    ) -> Result<CheckoutIntent, GatewayError> {
        if amount_minor_units <= 0 {
            return Err(GatewayError::Rejected(format!(
                "amount must be positive, got {amount_minor_units}"
            )));
        }
        if metadata.plan_id.is_none() && metadata.bill_id.is_none() {
            return Err(GatewayError::Rejected(
                "metadata must reference a plan or a bill".to_string(),
            ));
        }
        let intent_id = IntentId(format!("pi_{}", Uuid::new_v4().simple()));
        tracing::debug!(%intent_id, amount_minor_units, purpose, currency = %self.currency, "checkout intent created");
        Ok(CheckoutIntent {
            redirect_url: format!("{}/{}", self.base_url.trim_end_matches('/'), intent_id),
            intent_id,
        })
    }
}

/// Hosted e-signature adapter.
#[derive(Debug, Clone)]
pub struct HostedSigning {
    base_url: String,
}

impl HostedSigning {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl SignatureService for HostedSigning {
    fn send_for_signature(
        &self,
        document: &[u8],
        signer_email: &str,
        _signer_name: &str,
    ) -> Result<SigningRequest, GatewayError> {
        if document.is_empty() {
            return Err(GatewayError::Rejected("empty document".to_string()));
        }
        if !signer_email.contains('@') {
            return Err(GatewayError::Rejected(format!(
                "invalid signer email '{signer_email}'"
            )));
        }
        let submission_id = format!("sub_{}", Uuid::new_v4().simple());
        Ok(SigningRequest {
            signing_url: format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                submission_id
            ),
            submission_id,
        })
    }
}

/// Signature service used when signing is switched off in configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSigning;

impl SignatureService for DisabledSigning {
    fn send_for_signature(
        &self,
        _document: &[u8],
        _signer_email: &str,
        _signer_name: &str,
    ) -> Result<SigningRequest, GatewayError> {
        Err(GatewayError::Unavailable("signing disabled".to_string()))
    }
}
