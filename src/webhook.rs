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

//! Callback payloads from the payment processor and signature provider.
//!
//! # Example
//!
//! ```
//! use rent_ledger::webhook::PaymentEvent;
//!
//! let body = br#"{"eventType":"payment.completed","intentId":"pi_1","metadata":{"billId":4}}"#;
//! let event = PaymentEvent::from_slice(body).unwrap();
//! assert!(event.is_completion());
//! ```

use crate::base::IntentId;
use crate::delivery_log::EntityRef;
use crate::gateway::IntentMetadata;
use crate::reconciliation::ReconciliationAnomaly;
use crate::rent_plan::SigningStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event type that carries a successful payment.
pub const PAYMENT_COMPLETED: &str = "payment.completed";

#[derive(Error, Debug)]
pub enum WebhookError {
    /// Body is not a valid event payload
    #[error("malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub event_type: String,
    pub intent_id: IntentId,
    #[serde(default)]
    pub metadata: IntentMetadata,
}

impl PaymentEvent {
    pub fn completed(intent_id: IntentId, metadata: IntentMetadata) -> Self {
        Self {
            event_type: PAYMENT_COMPLETED.to_string(),
            intent_id,
            metadata,
        }
    }

    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn is_completion(&self) -> bool {
        self.event_type == PAYMENT_COMPLETED
    }

    /// Entity the event is addressed to. A plan wins if both are present.
    pub fn entity(&self) -> EntityRef {
        match (self.metadata.plan_id, self.metadata.bill_id) {
            (Some(plan_id), _) => EntityRef::Plan(plan_id),
            (None, Some(bill_id)) => EntityRef::Bill(bill_id),
            (None, None) => EntityRef::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningEvent {
    pub submission_id: String,
    pub status: SigningStatus,
}

impl SigningEvent {
    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// What the core did with a payment event. Every variant is acknowledged to
/// the processor with a success response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum WebhookOutcome {
    /// First application; state and side effects committed.
    Applied { entity: EntityRef, points_awarded: u64 },
    /// Duplicate delivery; nothing changed.
    AlreadyApplied { entity: EntityRef },
    /// Not an event type the core acts on.
    Ignored { event_type: String },
    /// Recorded and handed to operators. `applied` is true when state still changed.
    Anomaly {
        anomaly: ReconciliationAnomaly,
        applied: bool,
    },
}

impl WebhookOutcome {
    /// Whether this delivery changed ledger state.
    pub fn changed_state(&self) -> bool {
        match self {
            Self::Applied { .. } => true,
            Self::Anomaly { applied, .. } => *applied,
            Self::AlreadyApplied { .. } | Self::Ignored { .. } => false,
        }
    }
}
