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

//! # Rent Ledger
//!
//! The financial lifecycle core of a rental management platform: rent plans
//! that a tenant accepts by paying a deposit, bills paid through an external
//! processor, on-time payment rewards, monthly budget streaks and points
//! redemption.
//!
//! ## Core Components
//!
//! - [`Engine`]: Owns every record and applies all state transitions
//! - [`RentPlan`]: Lease offer lifecycle (pending → accepted → completed)
//! - [`Bill`]: Single payable obligation, paid exactly once
//! - [`PointsAccount`]: Append-only reward and redemption ledger per tenant
//! - [`Budget`]: Monthly budget with a daily under-budget streak
//! - [`WebhookOutcome`]: Result of reconciling a processor callback
//! - [`LedgerError`]: Error types for rejected operations
//!
//! ## Example
//!
//! ```
//! use rent_ledger::{Engine, IntentMetadata, NewBill, BillKind, PaymentEvent, PlanTerms, Role};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let landlord = engine.register_user(Role::Landlord, "Lee", "lee@example.com").unwrap();
//! let tenant = engine.register_user(Role::Tenant, "Tia", "tia@example.com").unwrap();
//!
//! // Landlord offers a lease, tenant accepts and pays the deposit
//! let terms = PlanTerms {
//!     monthly_rent: dec!(1500),
//!     deposit: dec!(3000),
//!     duration_months: 12,
//!     start_date: None,
//! };
//! let plan = engine.propose_plan(landlord, tenant, terms).unwrap();
//! let checkout = engine.accept_plan(tenant, plan).unwrap();
//! engine.handle_payment_event(&PaymentEvent::completed(
//!     checkout.intent_id,
//!     IntentMetadata::for_plan(plan, tenant, landlord),
//! ));
//!
//! // The landlord can now bill the tenant
//! let bill = engine
//!     .create_bill(landlord, tenant, NewBill::new(BillKind::Utilities, dec!(200), "2099-03-01").unwrap())
//!     .unwrap();
//! let checkout = engine.initiate_bill_payment(tenant, bill).unwrap();
//! engine.handle_payment_event(&PaymentEvent::completed(
//!     checkout.intent_id,
//!     IntentMetadata::for_bill(bill, tenant, landlord),
//! ));
//!
//! assert_eq!(engine.points_balance(tenant).unwrap(), 20);
//! ```
//!
//! ## Thread Safety
//!
//! Records are stored in concurrent maps and each carries its own lock, so
//! operations on different tenants run in parallel and redelivered webhooks
//! for one record serialize on that record.

mod base;
pub mod bill;
pub mod budget;
pub mod clock;
pub mod config;
pub mod delivery_log;
mod engine;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod reconciliation;
pub mod rent_plan;
pub mod reward;
pub mod user;
pub mod webhook;

pub use base::{BillId, ExpenseId, IntentId, PlanId, RedemptionId, RequestId, RewardId, UserId};
pub use bill::{Bill, BillKind, NewBill};
pub use budget::{Budget, BudgetPeriod, BudgetProgress, CategoryShare, Expense, StreakOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use delivery_log::{DeliveryLog, EntityRef};
pub use engine::{Engine, EngineBuilder, TenantStatement};
pub use error::{ErrorKind, LedgerError};
pub use gateway::{
    CheckoutIntent, DisabledSigning, GatewayError, HostedCheckout, HostedSigning, IntentMetadata,
    PaymentGateway, SignatureService,
};
pub use reconciliation::{AnomalyKind, AnomalyQueue, ReconciliationAnomaly};
pub use rent_plan::{PlanStatus, PlanTerms, RentPlan, SigningStatus};
pub use reward::{PointsAccount, Reconciliation, Redemption, RedemptionReceipt, Reward, RewardKind, ShopItem};
pub use user::{Role, User};
pub use webhook::{PaymentEvent, SigningEvent, WebhookError, WebhookOutcome};
