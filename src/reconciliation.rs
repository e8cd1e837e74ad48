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

//! Reconciliation anomalies raised by the webhook path.
//!
//! An anomaly is a payment event that arrived for an entity in an unexpected
//! state. It is never returned to the processor as a failure; it is logged and
//! queued for an operator.

use crate::base::{BillId, IntentId, PlanId};
use crate::rent_plan::PlanStatus;
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AnomalyKind {
    /// Deposit cleared after the landlord cancelled; the plan was completed anyway.
    ConfirmedAfterCancel { plan_id: PlanId },
    /// Event intent does not match any intent the entity issued.
    IntentMismatch { entity: String },
    /// Plan has no outstanding payment (pending or rejected).
    NotAwaitingPayment { plan_id: PlanId, status: PlanStatus },
    /// Bill already settled through another intent; the tenant paid twice.
    SecondPayment { bill_id: BillId, settled_by: Option<IntentId> },
    /// Metadata names a plan or bill that does not exist.
    UnknownEntity { entity: String },
    /// Metadata names neither a plan nor a bill.
    Unroutable,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfirmedAfterCancel { plan_id } => {
                write!(f, "payment confirmed for cancelled plan {plan_id}")
            }
            Self::IntentMismatch { entity } => write!(f, "intent was not issued by {entity}"),
            Self::NotAwaitingPayment { plan_id, status } => {
                write!(f, "plan {plan_id} is {status}, not awaiting payment")
            }
            Self::SecondPayment { bill_id, .. } => {
                write!(f, "bill {bill_id} was already paid through another intent")
            }
            Self::UnknownEntity { entity } => write!(f, "{entity} does not exist"),
            Self::Unroutable => f.write_str("event metadata names neither a plan nor a bill"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationAnomaly {
    pub intent_id: IntentId,
    #[serde(flatten)]
    pub kind: AnomalyKind,
    pub detected_at: DateTime<Utc>,
}

/// Operator queue of anomalies, drained by whoever follows them up.
#[derive(Debug, Default)]
pub struct AnomalyQueue {
    queue: SegQueue<ReconciliationAnomaly>,
}

impl AnomalyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn raise(&self, intent_id: &IntentId, kind: AnomalyKind, now: DateTime<Utc>) -> ReconciliationAnomaly {
        tracing::warn!(%intent_id, anomaly = %kind, "reconciliation anomaly");
        let anomaly = ReconciliationAnomaly {
            intent_id: intent_id.clone(),
            kind,
            detected_at: now,
        };
        self.queue.push(anomaly.clone());
        anomaly
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn drain(&self) -> Vec<ReconciliationAnomaly> {
        std::iter::from_fn(|| self.queue.pop()).collect()
    }
}
