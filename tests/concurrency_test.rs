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

//! Concurrency tests against the real engine.
//!
//! Webhook redeliveries, streak evaluations and redemptions race on the same
//! records from many threads. parking_lot's deadlock detector watches the
//! lock graph while they run.

use chrono::NaiveDate;
use parking_lot::deadlock;
use rayon::prelude::*;
use rent_ledger::{
    BillId, BillKind, BudgetPeriod, Engine, IntentMetadata, ManualClock, NewBill, PaymentEvent,
    PlanStatus, PlanTerms, RequestId, Role, ShopItem, StreakOutcome, UserId, WebhookOutcome,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Engine with `tenants` tenants, each leased from one landlord.
fn leased_engine(tenants: usize) -> (Arc<Engine>, Arc<ManualClock>, UserId, Vec<UserId>) {
    let clock = Arc::new(ManualClock::on(date(2025, 2, 1)));
    let engine = Arc::new(Engine::builder().clock(clock.clone()).build());
    let landlord = engine
        .register_user(Role::Landlord, "Lee", "lee@example.com")
        .unwrap();

    let ids = (0..tenants)
        .map(|i| {
            let tenant = engine
                .register_user(Role::Tenant, &format!("Tenant {i}"), &format!("t{i}@example.com"))
                .unwrap();
            let plan = engine
                .propose_plan(
                    landlord,
                    tenant,
                    PlanTerms {
                        monthly_rent: dec!(1200),
                        deposit: dec!(1200),
                        duration_months: 12,
                        start_date: None,
                    },
                )
                .unwrap();
            let checkout = engine.accept_plan(tenant, plan).unwrap();
            engine.handle_payment_event(&PaymentEvent::completed(
                checkout.intent_id,
                IntentMetadata::for_plan(plan, tenant, landlord),
            ));
            tenant
        })
        .collect();

    (engine, clock, landlord, ids)
}

fn open_bill(engine: &Engine, landlord: UserId, tenant: UserId) -> (BillId, PaymentEvent) {
    let bill = engine
        .create_bill(
            landlord,
            tenant,
            NewBill::new(BillKind::Rent, dec!(200), "2025-03-01").unwrap(),
        )
        .unwrap();
    let checkout = engine.initiate_bill_payment(tenant, bill).unwrap();
    let event = PaymentEvent::completed(
        checkout.intent_id,
        IntentMetadata::for_bill(bill, tenant, landlord),
    );
    (bill, event)
}

#[test]
fn concurrent_redeliveries_apply_once() {
    let detector = start_deadlock_detector();
    let (engine, _clock, landlord, tenants) = leased_engine(1);
    let tenant = tenants[0];
    let (bill, event) = open_bill(&engine, landlord, tenant);

    let applied = (0..256)
        .into_par_iter()
        .map(|_| engine.handle_payment_event(&event))
        .filter(WebhookOutcome::changed_state)
        .count();

    stop_deadlock_detector(detector);

    assert_eq!(applied, 1);
    assert!(engine.bill(&bill).unwrap().is_paid);
    assert_eq!(engine.points_balance(tenant).unwrap(), 20);
    assert_eq!(engine.rewards(tenant).unwrap().len(), 1);
    assert_eq!(
        engine.deliveries().get(&event.intent_id).unwrap().deliveries,
        256
    );
}

#[test]
fn concurrent_streak_evaluations_count_one_day() {
    let detector = start_deadlock_detector();
    let clock = Arc::new(ManualClock::on(date(2025, 3, 5)));
    let engine = Arc::new(Engine::builder().clock(clock).build());
    let tenant = engine
        .register_user(Role::Tenant, "Tia", "tia@example.com")
        .unwrap();
    engine
        .set_budget(tenant, BudgetPeriod::Month, dec!(2000), &[])
        .unwrap();

    let outcomes: Vec<StreakOutcome> = (0..64)
        .into_par_iter()
        .map(|_| engine.evaluate_streak(tenant).unwrap())
        .collect();

    stop_deadlock_detector(detector);

    let advanced = outcomes
        .iter()
        .filter(|o| matches!(o, StreakOutcome::Advanced { .. }))
        .count();
    assert_eq!(advanced, 1);
    assert_eq!(
        engine
            .budget(tenant, BudgetPeriod::Month)
            .unwrap()
            .days_completed,
        1
    );
}

#[test]
fn concurrent_redemptions_never_overdraw() {
    let detector = start_deadlock_detector();
    let (engine, _clock, landlord, tenants) = leased_engine(1);
    let tenant = tenants[0];
    // 10 bills of $200 paid on time: 200 points
    for _ in 0..10 {
        let (_, event) = open_bill(&engine, landlord, tenant);
        engine.handle_payment_event(&event);
    }
    assert_eq!(engine.points_balance(tenant).unwrap(), 200);

    let item = ShopItem {
        id: "sticker".into(),
        name: "Sticker".into(),
        cost: 30,
    };
    let succeeded = (0..50)
        .into_par_iter()
        .filter(|i| {
            engine
                .redeem(tenant, &item, RequestId(format!("req-{i}")))
                .is_ok()
        })
        .count();

    stop_deadlock_detector(detector);

    assert_eq!(succeeded, 6);
    assert_eq!(engine.points_balance(tenant).unwrap(), 20);
    assert!(engine.reconcile(tenant).unwrap().is_consistent());
}

#[test]
fn cancel_racing_confirmation_ends_completed() {
    let detector = start_deadlock_detector();

    for _ in 0..50 {
        let clock = Arc::new(ManualClock::on(date(2025, 2, 1)));
        let engine = Arc::new(Engine::builder().clock(clock).build());
        let landlord = engine
            .register_user(Role::Landlord, "Lee", "lee@example.com")
            .unwrap();
        let tenant = engine
            .register_user(Role::Tenant, "Tia", "tia@example.com")
            .unwrap();
        let plan = engine
            .propose_plan(
                landlord,
                tenant,
                PlanTerms {
                    monthly_rent: dec!(1000),
                    deposit: dec!(2000),
                    duration_months: 12,
                    start_date: None,
                },
            )
            .unwrap();
        let checkout = engine.accept_plan(tenant, plan).unwrap();
        let event = PaymentEvent::completed(
            checkout.intent_id,
            IntentMetadata::for_plan(plan, tenant, landlord),
        );

        let canceller = {
            let engine = engine.clone();
            thread::spawn(move || engine.cancel_plan(landlord, plan))
        };
        let confirmer = {
            let engine = engine.clone();
            thread::spawn(move || engine.handle_payment_event(&event))
        };
        let cancelled = canceller.join().unwrap();
        let outcome = confirmer.join().unwrap();

        // Whichever runs first, the cleared deposit wins.
        assert!(outcome.changed_state());
        assert_eq!(engine.plan(&plan).unwrap().status, PlanStatus::Completed);
        assert_eq!(engine.anomalies().len(), usize::from(cancelled.is_ok()));
    }

    stop_deadlock_detector(detector);
}

#[test]
fn mixed_workload_across_tenants() {
    let detector = start_deadlock_detector();
    let (engine, clock, landlord, tenants) = leased_engine(16);
    clock.set_date(date(2025, 2, 20));

    let mut handles = Vec::new();
    for &tenant in &tenants {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            engine
                .set_budget(tenant, BudgetPeriod::Month, dec!(1500), &[])
                .unwrap();
            for i in 0..10 {
                let (_, event) = open_bill(&engine, landlord, tenant);
                engine.handle_payment_event(&event);
                engine.handle_payment_event(&event);
                engine
                    .record_expense(tenant, dec!(10), "food", date(2025, 2, 20))
                    .unwrap();
                engine.evaluate_streak(tenant).unwrap();
                let item = ShopItem {
                    id: "coffee".into(),
                    name: "Coffee".into(),
                    cost: 15,
                };
                let _ = engine.redeem(tenant, &item, RequestId(format!("{tenant}-{i}")));
                let _ = engine.tenant_statements();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    stop_deadlock_detector(detector);

    for statement in engine.tenant_statements() {
        assert!(statement.reconciled);
        assert_eq!(statement.rewards, 10);
        assert_eq!(statement.landlord, Some(landlord));
    }
}
