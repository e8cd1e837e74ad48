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

//! Benchmarks for the rent ledger engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Bill payment confirmation throughput
//! - Duplicate webhook deliveries (the idempotent no-op path)
//! - Parallel confirmations across tenants
//! - Daily streak evaluation

use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rent_ledger::{
    BillKind, BudgetPeriod, Engine, IntentMetadata, ManualClock, NewBill, PaymentEvent, PlanTerms,
    Role, UserId,
};
use rust_decimal_macros::dec;
use std::sync::Arc;

// =============================================================================
// Helper Functions
// =============================================================================

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Engine with `tenants` tenants leased from one landlord.
fn leased_engine(tenants: usize) -> (Engine, UserId, Vec<UserId>) {
    let clock = Arc::new(ManualClock::on(date(2025, 2, 1)));
    let engine = Engine::builder().clock(clock).build();
    let landlord = engine
        .register_user(Role::Landlord, "Lee", "lee@example.com")
        .unwrap();
    let tenants = (0..tenants)
        .map(|i| {
            let tenant = engine
                .register_user(Role::Tenant, &format!("T{i}"), &format!("t{i}@example.com"))
                .unwrap();
            let plan = engine
                .propose_plan(
                    landlord,
                    tenant,
                    PlanTerms {
                        monthly_rent: dec!(1000),
                        deposit: dec!(1000),
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
    (engine, landlord, tenants)
}

/// Issues a bill, opens its checkout and returns the completion event.
fn open_bill(engine: &Engine, landlord: UserId, tenant: UserId) -> PaymentEvent {
    let bill = engine
        .create_bill(
            landlord,
            tenant,
            NewBill::new(BillKind::Rent, dec!(1000), "2025-03-01").unwrap(),
        )
        .unwrap();
    let checkout = engine.initiate_bill_payment(tenant, bill).unwrap();
    PaymentEvent::completed(
        checkout.intent_id,
        IntentMetadata::for_bill(bill, tenant, landlord),
    )
}

// =============================================================================
// Confirmation Benchmarks
// =============================================================================

fn bench_confirmation_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("confirmation_throughput");

    for count in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_batched(
                || {
                    let (engine, landlord, tenants) = leased_engine(1);
                    let events: Vec<PaymentEvent> = (0..count)
                        .map(|_| open_bill(&engine, landlord, tenants[0]))
                        .collect();
                    (engine, events)
                },
                |(engine, events)| {
                    for event in &events {
                        black_box(engine.handle_payment_event(event));
                    }
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_duplicate_delivery(c: &mut Criterion) {
    let (engine, landlord, tenants) = leased_engine(1);
    let event = open_bill(&engine, landlord, tenants[0]);
    engine.handle_payment_event(&event);

    c.bench_function("duplicate_delivery", |b| {
        b.iter(|| black_box(engine.handle_payment_event(black_box(&event))))
    });
}

fn bench_parallel_confirmations(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_confirmations");

    for num_tenants in [10, 100].iter() {
        let bills_per_tenant = 20;
        group.throughput(Throughput::Elements((*num_tenants * bills_per_tenant) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_tenants),
            num_tenants,
            |b, &num_tenants| {
                b.iter_batched(
                    || {
                        let (engine, landlord, tenants) = leased_engine(num_tenants);
                        let events: Vec<PaymentEvent> = tenants
                            .iter()
                            .flat_map(|&tenant| {
                                (0..bills_per_tenant)
                                    .map(|_| open_bill(&engine, landlord, tenant))
                                    .collect::<Vec<_>>()
                            })
                            .collect();
                        (Arc::new(engine), events)
                    },
                    |(engine, events)| {
                        events.par_iter().for_each(|event| {
                            black_box(engine.handle_payment_event(event));
                        });
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

// =============================================================================
// Streak Benchmarks
// =============================================================================

fn bench_streak_month(c: &mut Criterion) {
    c.bench_function("streak_month", |b| {
        b.iter_batched(
            || {
                let clock = Arc::new(ManualClock::on(date(2025, 3, 1)));
                let engine = Engine::builder().clock(clock.clone()).build();
                let tenant = engine
                    .register_user(Role::Tenant, "Tia", "tia@example.com")
                    .unwrap();
                engine
                    .set_budget(tenant, BudgetPeriod::Month, dec!(2000), &[])
                    .unwrap();
                for day in 1..=28 {
                    engine
                        .record_expense(tenant, dec!(25), "food", date(2025, 3, day))
                        .unwrap();
                }
                (engine, clock, tenant)
            },
            |(engine, clock, tenant)| {
                for _ in 0..30 {
                    black_box(engine.evaluate_streak(tenant).unwrap());
                    clock.advance_days(1);
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_streak_parallel_tenants(c: &mut Criterion) {
    let mut group = c.benchmark_group("streak_parallel_tenants");

    for num_tenants in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*num_tenants as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_tenants),
            num_tenants,
            |b, &num_tenants| {
                b.iter_batched(
                    || {
                        let engine = Engine::builder()
                            .clock(Arc::new(ManualClock::on(date(2025, 3, 10))))
                            .build();
                        let tenants: Vec<UserId> = (0..num_tenants)
                            .map(|i| {
                                let tenant = engine
                                    .register_user(Role::Tenant, &format!("T{i}"), &format!("t{i}@example.com"))
                                    .unwrap();
                                engine
                                    .set_budget(tenant, BudgetPeriod::Month, dec!(1500), &[])
                                    .unwrap();
                                tenant
                            })
                            .collect();
                        (engine, tenants)
                    },
                    |(engine, tenants)| {
                        tenants.par_iter().for_each(|&tenant| {
                            black_box(engine.evaluate_streak(tenant).unwrap());
                        });
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    confirmation_benches,
    bench_confirmation_throughput,
    bench_duplicate_delivery,
    bench_parallel_confirmations,
);

criterion_group!(
    streak_benches,
    bench_streak_month,
    bench_streak_parallel_tenants,
);

criterion_main!(confirmation_benches, streak_benches);
