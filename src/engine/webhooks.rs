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

//! Webhook reconciliation.
//!
//! Deliveries are at-least-once and may arrive out of order or concurrently.
//! Each event is recorded in the delivery log, then routed by its metadata to
//! the plan or bill it pays for. Idempotency comes from the guarded
//! transitions on those records, not from the log.

use super::Engine;
use crate::base::IntentId;
use crate::delivery_log::EntityRef;
use crate::reconciliation::AnomalyKind;
use crate::webhook::{PaymentEvent, SigningEvent, WebhookError, WebhookOutcome};
use tracing::debug;

impl Engine {
    /// Applies one payment event. Always yields an outcome; nothing here is
    /// reported to the processor as a failure.
    #[tracing::instrument(
        name = "webhook.payment",
        skip_all,
        fields(intent_id = %event.intent_id, event_type = %event.event_type)
    )]
    pub fn handle_payment_event(&self, event: &PaymentEvent) -> WebhookOutcome {
        let entity = event.entity();
        let seen = self
            .deliveries
            .record(&event.intent_id, entity, self.clock.now());
        if seen > 1 {
            debug!(deliveries = seen, "redelivered intent");
        }

        if !event.is_completion() {
            debug!("event type not handled");
            return WebhookOutcome::Ignored {
                event_type: event.event_type.clone(),
            };
        }

        match entity {
            EntityRef::Plan(plan_id) => self.confirm_plan_payment(&event.intent_id, plan_id),
            EntityRef::Bill(bill_id) => self.confirm_bill_payment(&event.intent_id, bill_id),
            EntityRef::Unknown => self.anomaly(&event.intent_id, AnomalyKind::Unroutable, false),
        }
    }

    /// Parses and applies a raw payment webhook body.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::Malformed`] - Body is not a payment event.
    pub fn handle_payment_webhook(&self, body: &[u8]) -> Result<WebhookOutcome, WebhookError> {
        let event = PaymentEvent::from_slice(body)?;
        Ok(self.handle_payment_event(&event))
    }

    /// Applies a signature provider callback. Returns whether the plan's
    /// signing status moved.
    pub fn handle_signing_event(&self, event: &SigningEvent) -> bool {
        self.record_signing(&event.submission_id, event.status)
    }

    pub(super) fn anomaly(&self, intent_id: &IntentId, kind: AnomalyKind, applied: bool) -> WebhookOutcome {
        let anomaly = self.anomalies.raise(intent_id, kind, self.clock.now());
        WebhookOutcome::Anomaly { anomaly, applied }
    }
}
