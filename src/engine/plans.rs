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

//! Rent plan operations.

use super::Engine;
use crate::base::{IntentId, PlanId, UserId, minor_units};
use crate::delivery_log::EntityRef;
use crate::error::LedgerError;
use crate::gateway::{CheckoutIntent, IntentMetadata};
use crate::reconciliation::AnomalyKind;
use crate::rent_plan::{PlanConfirmation, PlanStatus, PlanTerms, RentPlan, SigningStatus};
use crate::user::{Role, User};
use crate::webhook::WebhookOutcome;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Engine {
    /// Creates a pending plan and sends the lease out for signature.
    ///
    /// Signing is best-effort: a failing signature service is logged and the
    /// plan is still created with `signing_status = pending`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidTerms`] - Rent, deposit or duration not positive.
    /// - [`LedgerError::UserNotFound`] / [`LedgerError::RoleMismatch`] - Parties are not a landlord and a tenant.
    pub fn propose_plan(
        &self,
        landlord_id: UserId,
        tenant_id: UserId,
        terms: PlanTerms,
    ) -> Result<PlanId, LedgerError> {
        terms.validate()?;
        let landlord = self.require_role(landlord_id, Role::Landlord)?;
        let tenant = self.require_role(tenant_id, Role::Tenant)?;

        let id = PlanId(self.ids.plans.next());
        let mut plan = RentPlan::propose(id, landlord_id, tenant_id, terms, self.clock.now())?;
        self.request_signature(&mut plan, &landlord, &tenant);

        self.plans.insert(id, Arc::new(Mutex::new(plan)));
        info!(plan_id = %id, %landlord_id, %tenant_id, "rent plan proposed");
        Ok(id)
    }

    fn request_signature(&self, plan: &mut RentPlan, landlord: &User, tenant: &User) {
        let document = plan.lease_document(&landlord.name, &tenant.name);
        match self
            .signer
            .send_for_signature(&document, &tenant.email, &tenant.name)
        {
            Ok(request) => {
                self.submissions
                    .insert(request.submission_id.clone(), plan.id);
                plan.signing_submission_id = Some(request.submission_id);
                plan.signing_url = Some(request.signing_url);
            }
            Err(error) => {
                warn!(plan_id = %plan.id, %error, "lease signing request failed; continuing unsigned");
            }
        }
    }

    /// Tenant accepts a pending plan and receives a deposit checkout.
    ///
    /// The tenant is linked to the landlord immediately so the landlord sees
    /// them before the deposit clears.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotOwner`] - Requester is not the plan's tenant.
    /// - [`LedgerError::InvalidState`] - Plan is not pending.
    /// - [`LedgerError::Gateway`] - No intent could be created; the plan stays pending.
    pub fn accept_plan(
        &self,
        tenant_id: UserId,
        plan_id: PlanId,
    ) -> Result<CheckoutIntent, LedgerError> {
        let plan_ref = self.plan_ref(plan_id)?;
        // Held across the gateway call so two accepts cannot both open intents.
        let mut plan = plan_ref.lock();
        if plan.tenant_id != tenant_id {
            return Err(LedgerError::NotOwner(tenant_id));
        }
        plan.ensure_acceptable()?;

        let metadata = IntentMetadata::for_plan(plan.id, plan.tenant_id, plan.landlord_id);
        let checkout = self
            .gateway
            .create_intent(minor_units(plan.deposit)?, "security deposit", &metadata)
            .inspect_err(|error| warn!(%plan_id, %error, "deposit intent failed"))?;

        plan.accept(checkout.intent_id.clone(), self.clock.now())?;
        self.link_landlord(plan.tenant_id, plan.landlord_id);
        info!(%plan_id, intent_id = %checkout.intent_id, deposit = %plan.deposit, "rent plan accepted");
        Ok(checkout)
    }

    /// # Errors
    ///
    /// - [`LedgerError::NotOwner`] - Requester is not the plan's tenant.
    /// - [`LedgerError::InvalidState`] - Plan is not pending.
    pub fn reject_plan(&self, tenant_id: UserId, plan_id: PlanId) -> Result<(), LedgerError> {
        let plan_ref = self.plan_ref(plan_id)?;
        let mut plan = plan_ref.lock();
        if plan.tenant_id != tenant_id {
            return Err(LedgerError::NotOwner(tenant_id));
        }
        plan.reject(self.clock.now())?;
        info!(%plan_id, "rent plan rejected");
        Ok(())
    }

    /// # Errors
    ///
    /// - [`LedgerError::NotOwner`] - Requester is not the plan's landlord.
    /// - [`LedgerError::InvalidState`] - Plan is completed, rejected or already cancelled.
    pub fn cancel_plan(&self, landlord_id: UserId, plan_id: PlanId) -> Result<(), LedgerError> {
        let plan_ref = self.plan_ref(plan_id)?;
        let mut plan = plan_ref.lock();
        if plan.landlord_id != landlord_id {
            return Err(LedgerError::NotOwner(landlord_id));
        }
        let was = plan.status;
        plan.cancel(self.clock.now())?;
        info!(%plan_id, from = %was, "rent plan cancelled");
        Ok(())
    }

    pub fn plan(&self, plan_id: &PlanId) -> Option<RentPlan> {
        self.plans.get(plan_id).map(|p| p.lock().clone())
    }

    /// Plans where `user_id` is the tenant or the landlord, ordered by id.
    pub fn plans_for(&self, user_id: UserId) -> Vec<RentPlan> {
        let refs: Vec<Arc<Mutex<RentPlan>>> = self.plans.iter().map(|p| Arc::clone(&p)).collect();
        let mut plans: Vec<RentPlan> = refs
            .iter()
            .map(|p| p.lock().clone())
            .filter(|p| p.tenant_id == user_id || p.landlord_id == user_id)
            .collect();
        plans.sort_by_key(|p| p.id);
        plans
    }

    /// Applies a signing callback. Returns whether the status moved.
    pub fn record_signing(&self, submission_id: &str, status: SigningStatus) -> bool {
        let Some(plan_id) = self.submissions.get(submission_id).map(|p| *p) else {
            warn!(submission_id, "signing callback for unknown submission");
            return false;
        };
        let Ok(plan_ref) = self.plan_ref(plan_id) else {
            return false;
        };
        let mut plan = plan_ref.lock();
        let moved = plan.record_signing(status);
        if moved {
            info!(%plan_id, ?status, "signing status updated");
        } else {
            debug!(%plan_id, ?status, current = ?plan.signing_status, "stale signing callback ignored");
        }
        moved
    }

    /// Webhook path: completes the plan the deposit was paid for.
    pub(super) fn confirm_plan_payment(&self, intent_id: &IntentId, plan_id: PlanId) -> WebhookOutcome {
        let entity = EntityRef::Plan(plan_id);
        let now = self.clock.now();
        let Ok(plan_ref) = self.plan_ref(plan_id) else {
            return self.anomaly(
                intent_id,
                AnomalyKind::UnknownEntity {
                    entity: format!("plan {plan_id}"),
                },
                false,
            );
        };

        let mut plan = plan_ref.lock();
        match plan.confirm_payment(intent_id, now) {
            PlanConfirmation::AlreadyCompleted => {
                debug!(%plan_id, "duplicate deposit confirmation ignored");
                WebhookOutcome::AlreadyApplied { entity }
            }
            PlanConfirmation::IntentMismatch => self.anomaly(
                intent_id,
                AnomalyKind::IntentMismatch {
                    entity: format!("plan {plan_id}"),
                },
                false,
            ),
            PlanConfirmation::NotAwaitingPayment(status) => self.anomaly(
                intent_id,
                AnomalyKind::NotAwaitingPayment { plan_id, status },
                false,
            ),
            PlanConfirmation::Completed { previous } => {
                self.link_landlord(plan.tenant_id, plan.landlord_id);
                info!(
                    %plan_id,
                    next_due_date = ?plan.next_due_date,
                    "rent plan completed"
                );
                if previous == PlanStatus::Cancelled {
                    self.anomaly(
                        intent_id,
                        AnomalyKind::ConfirmedAfterCancel { plan_id },
                        true,
                    )
                } else {
                    WebhookOutcome::Applied {
                        entity,
                        points_awarded: 0,
                    }
                }
            }
        }
    }

    fn plan_ref(&self, plan_id: PlanId) -> Result<Arc<Mutex<RentPlan>>, LedgerError> {
        self.plans
            .get(&plan_id)
            .map(|p| Arc::clone(&p))
            .ok_or(LedgerError::PlanNotFound(plan_id))
    }
}
