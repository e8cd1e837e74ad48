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

//! Bill operations.

use super::Engine;
use crate::base::{BillId, IntentId, RewardId, UserId, minor_units};
use crate::bill::{Bill, BillConfirmation, NewBill};
use crate::delivery_log::EntityRef;
use crate::error::LedgerError;
use crate::gateway::{CheckoutIntent, IntentMetadata};
use crate::reconciliation::AnomalyKind;
use crate::reward::{Grant, points_for_payment};
use crate::user::Role;
use crate::webhook::WebhookOutcome;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Engine {
    /// Issues a bill. Only the tenant's current landlord may do so, which
    /// means a rent plan must already have linked them.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::RoleMismatch`] - Issuer is not a landlord or recipient not a tenant.
    /// - [`LedgerError::NotCurrentLandlord`] - No relationship with this tenant.
    pub fn create_bill(
        &self,
        landlord_id: UserId,
        tenant_id: UserId,
        request: NewBill,
    ) -> Result<BillId, LedgerError> {
        self.require_role(landlord_id, Role::Landlord)?;
        let tenant = self.require_role(tenant_id, Role::Tenant)?;
        if tenant.landlord_id != Some(landlord_id) {
            return Err(LedgerError::NotCurrentLandlord);
        }
        minor_units(request.amount)?;

        let id = BillId(self.ids.bills.next());
        let bill = Bill::new(id, landlord_id, tenant_id, request, self.clock.now());
        info!(bill_id = %id, %tenant_id, kind = %bill.kind, amount = %bill.amount, due = %bill.due_date, "bill issued");
        self.bills.insert(id, Arc::new(Mutex::new(bill)));
        Ok(id)
    }

    /// Tenant opens a checkout for an unpaid bill. `is_paid` is untouched
    /// until the processor confirms.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotOwner`] - Requester is not the bill's tenant.
    /// - [`LedgerError::InvalidState`] - Bill is already paid.
    /// - [`LedgerError::Gateway`] - No intent could be created.
    pub fn initiate_bill_payment(
        &self,
        tenant_id: UserId,
        bill_id: BillId,
    ) -> Result<CheckoutIntent, LedgerError> {
        let bill_ref = self.bill_ref(bill_id)?;
        let mut bill = bill_ref.lock();
        if bill.tenant_id != tenant_id {
            return Err(LedgerError::NotOwner(tenant_id));
        }
        bill.ensure_payable()?;

        let metadata = IntentMetadata::for_bill(bill.id, bill.tenant_id, bill.landlord_id);
        let purpose = format!("{} bill", bill.kind);
        let checkout = self
            .gateway
            .create_intent(minor_units(bill.amount)?, &purpose, &metadata)
            .inspect_err(|error| warn!(%bill_id, %error, "bill intent failed"))?;

        bill.begin_payment(checkout.intent_id.clone())?;
        info!(%bill_id, intent_id = %checkout.intent_id, "bill payment started");
        Ok(checkout)
    }

    pub fn bill(&self, bill_id: &BillId) -> Option<Bill> {
        self.bills.get(bill_id).map(|b| b.lock().clone())
    }

    /// Bills where `user_id` is the tenant or the landlord, ordered by id.
    pub fn bills_for(&self, user_id: UserId) -> Vec<Bill> {
        let refs: Vec<Arc<Mutex<Bill>>> = self.bills.iter().map(|b| Arc::clone(&b)).collect();
        let mut bills: Vec<Bill> = refs
            .iter()
            .map(|b| b.lock().clone())
            .filter(|b| b.tenant_id == user_id || b.landlord_id == user_id)
            .collect();
        bills.sort_by_key(|b| b.id);
        bills
    }

    /// Webhook path: marks the bill paid and accrues on-time points.
    ///
    /// The paid flag, the reward row and the balance credit are applied while
    /// the bill lock is held; concurrent deliveries of the same intent observe
    /// `is_paid` and stop.
    pub(super) fn confirm_bill_payment(&self, intent_id: &IntentId, bill_id: BillId) -> WebhookOutcome {
        let entity = EntityRef::Bill(bill_id);
        let now = self.clock.now();
        let Ok(bill_ref) = self.bill_ref(bill_id) else {
            return self.anomaly(
                intent_id,
                AnomalyKind::UnknownEntity {
                    entity: format!("bill {bill_id}"),
                },
                false,
            );
        };

        let mut bill = bill_ref.lock();
        match bill.confirm_payment(intent_id, now) {
            BillConfirmation::AlreadyPaid => {
                debug!(%bill_id, "duplicate bill confirmation ignored");
                WebhookOutcome::AlreadyApplied { entity }
            }
            BillConfirmation::PaidByOtherIntent => self.anomaly(
                intent_id,
                AnomalyKind::SecondPayment {
                    bill_id,
                    settled_by: bill.settled_by.clone(),
                },
                false,
            ),
            BillConfirmation::IntentMismatch => self.anomaly(
                intent_id,
                AnomalyKind::IntentMismatch {
                    entity: format!("bill {bill_id}"),
                },
                false,
            ),
            BillConfirmation::Paid { on_time } => {
                let points = points_for_payment(bill.amount, on_time, self.rewards.on_time_percent);
                let grant = Grant::Payment {
                    bill_id,
                    amount: bill.amount,
                    points,
                };
                let awarded = self
                    .points_account(bill.tenant_id)
                    .accrue(RewardId(self.ids.rewards.next()), grant, now)
                    .map_or(0, |reward| reward.points_earned);
                info!(%bill_id, on_time, points = awarded, "bill paid");
                WebhookOutcome::Applied {
                    entity,
                    points_awarded: awarded,
                }
            }
        }
    }

    fn bill_ref(&self, bill_id: BillId) -> Result<Arc<Mutex<Bill>>, LedgerError> {
        self.bills
            .get(&bill_id)
            .map(|b| Arc::clone(&b))
            .ok_or(LedgerError::BillNotFound(bill_id))
    }
}
