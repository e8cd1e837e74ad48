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

use chrono::Utc;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rent_ledger::bill::parse_date;
use rent_ledger::logging::init_tracing;
use rent_ledger::{
    BillId, BillKind, BudgetPeriod, CategoryShare, Config, Engine, IntentMetadata, LedgerError,
    ManualClock, NewBill, PaymentEvent, PlanId, PlanTerms, RequestId, Role, ShopItem, UserId,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Rent Ledger - Replay a script of ledger operations
///
/// Reads operations from a CSV file, applies them in order against a fresh
/// engine and writes one statement row per tenant to stdout.
#[derive(Parser, Debug)]
#[command(name = "rent-ledger")]
#[command(about = "Replays rent ledger operations from a CSV script", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,actor,subject,amount,date,detail
    /// Example: cargo run -- script.csv > statements.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    init_tracing();
    let args = Args::parse();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match replay(BufReader::new(file), &config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error replaying operations: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_statements(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, actor, subject, amount, date, detail`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    actor: Option<u64>,
    #[serde(default)]
    subject: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    date: String,
    #[serde(default)]
    detail: String,
}

#[derive(Error, Debug)]
enum ReplayError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("bad {field} '{value}'")]
    BadValue { field: &'static str, value: String },

    #[error("unknown operation '{0}'")]
    UnknownOp(String),
}

impl CsvRecord {
    fn actor(&self) -> Result<UserId, ReplayError> {
        self.actor.map(UserId).ok_or(ReplayError::Missing("actor"))
    }

    fn amount(&self) -> Result<Decimal, ReplayError> {
        self.amount.ok_or(ReplayError::Missing("amount"))
    }

    fn subject_id(&self) -> Result<u64, ReplayError> {
        self.subject.parse().map_err(|_| ReplayError::BadValue {
            field: "subject",
            value: self.subject.clone(),
        })
    }
}

/// Applies one operation.
///
/// | op       | actor    | subject          | amount | date     | detail               |
/// |----------|----------|------------------|--------|----------|----------------------|
/// | today    |          |                  |        | day      |                      |
/// | register |          | tenant/landlord  |        |          | name                 |
/// | propose  | landlord | tenant           | rent   | start    | deposit/months       |
/// | accept   | tenant   | plan             |        |          |                      |
/// | reject   | tenant   | plan             |        |          |                      |
/// | cancel   | landlord | plan             |        |          |                      |
/// | bill     | landlord | tenant           | amount | due      | kind                 |
/// | pay      | tenant   | bill             |        |          |                      |
/// | confirm  |          | plan:N or bill:N |        |          |                      |
/// | budget   | tenant   | period           | amount |          | cat:pct;cat:pct      |
/// | expense  | tenant   |                  | amount | day      | category             |
/// | streak   | tenant   |                  |        |          |                      |
/// | redeem   | tenant   | item             | cost   |          | request id           |
fn apply(engine: &Engine, clock: &ManualClock, record: &CsvRecord) -> Result<(), ReplayError> {
    match record.op.to_lowercase().as_str() {
        "today" => clock.set_date(parse_date(&record.date)?),
        "register" => {
            let role = match record.subject.to_lowercase().as_str() {
                "tenant" => Role::Tenant,
                "landlord" => Role::Landlord,
                other => {
                    return Err(ReplayError::BadValue {
                        field: "role",
                        value: other.to_string(),
                    });
                }
            };
            let email = format!("{}@replay.local", record.detail.to_lowercase().replace(' ', "."));
            engine.register_user(role, &record.detail, &email)?;
        }
        "propose" => {
            let (deposit, months) = record.detail.split_once('/').ok_or(ReplayError::Missing("deposit/months"))?;
            let terms = PlanTerms {
                monthly_rent: record.amount()?,
                deposit: deposit.trim().parse().map_err(|_| ReplayError::BadValue {
                    field: "deposit",
                    value: deposit.to_string(),
                })?,
                duration_months: months.trim().parse().map_err(|_| ReplayError::BadValue {
                    field: "months",
                    value: months.to_string(),
                })?,
                start_date: if record.date.is_empty() {
                    None
                } else {
                    Some(parse_date(&record.date)?)
                },
            };
            engine.propose_plan(record.actor()?, UserId(record.subject_id()?), terms)?;
        }
        "accept" => {
            engine.accept_plan(record.actor()?, PlanId(record.subject_id()?))?;
        }
        "reject" => engine.reject_plan(record.actor()?, PlanId(record.subject_id()?))?,
        "cancel" => engine.cancel_plan(record.actor()?, PlanId(record.subject_id()?))?,
        "bill" => {
            let kind: BillKind = record.detail.parse()?;
            let request = NewBill::new(kind, record.amount()?, &record.date)?;
            engine.create_bill(record.actor()?, UserId(record.subject_id()?), request)?;
        }
        "pay" => {
            engine.initiate_bill_payment(record.actor()?, BillId(record.subject_id()?))?;
        }
        "confirm" => {
            let event = completion_for(engine, &record.subject)?;
            let outcome = engine.handle_payment_event(&event);
            debug!(?outcome, "replayed confirmation");
        }
        "budget" => {
            let period: BudgetPeriod = if record.subject.is_empty() {
                BudgetPeriod::Month
            } else {
                record.subject.parse()?
            };
            let shares = parse_shares(&record.detail)?;
            engine.set_budget(record.actor()?, period, record.amount()?, &shares)?;
        }
        "expense" => {
            engine.record_expense(
                record.actor()?,
                record.amount()?,
                &record.detail,
                parse_date(&record.date)?,
            )?;
        }
        "streak" => {
            engine.evaluate_streak(record.actor()?)?;
        }
        "redeem" => {
            let cost = record.amount()?;
            let item = ShopItem {
                id: record.subject.clone(),
                name: record.subject.clone(),
                cost: cost.to_u64().ok_or_else(|| ReplayError::BadValue {
                    field: "cost",
                    value: cost.to_string(),
                })?,
            };
            engine.redeem(record.actor()?, &item, RequestId(record.detail.clone()))?;
        }
        other => return Err(ReplayError::UnknownOp(other.to_string())),
    }
    Ok(())
}

/// Builds the processor callback for the intent most recently issued for an entity.
fn completion_for(engine: &Engine, subject: &str) -> Result<PaymentEvent, ReplayError> {
    let bad = || ReplayError::BadValue {
        field: "subject",
        value: subject.to_string(),
    };
    let (kind, id) = subject.split_once(':').ok_or_else(bad)?;
    let id: u64 = id.trim().parse().map_err(|_| bad())?;
    match kind.trim() {
        "plan" => {
            let plan = engine.plan(&PlanId(id)).ok_or(LedgerError::PlanNotFound(PlanId(id)))?;
            let intent = plan.payment_intent_id.ok_or(ReplayError::Missing("plan intent"))?;
            Ok(PaymentEvent::completed(
                intent,
                IntentMetadata::for_plan(plan.id, plan.tenant_id, plan.landlord_id),
            ))
        }
        "bill" => {
            let bill = engine.bill(&BillId(id)).ok_or(LedgerError::BillNotFound(BillId(id)))?;
            let intent = bill.payment_intent_id.ok_or(ReplayError::Missing("bill intent"))?;
            Ok(PaymentEvent::completed(
                intent,
                IntentMetadata::for_bill(bill.id, bill.tenant_id, bill.landlord_id),
            ))
        }
        _ => Err(bad()),
    }
}

/// Parses `rent:50;food:30;fun:20`.
fn parse_shares(detail: &str) -> Result<Vec<CategoryShare>, ReplayError> {
    detail
        .split(';')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (category, pct) = part.split_once(':').ok_or(ReplayError::BadValue {
                field: "category",
                value: part.to_string(),
            })?;
            Ok(CategoryShare {
                category: category.trim().to_string(),
                percentage: pct.trim().parse().map_err(|_| ReplayError::BadValue {
                    field: "percentage",
                    value: pct.to_string(),
                })?,
            })
        })
        .collect()
}

/// Replays operations from a CSV reader.
///
/// Rows are streamed in order against an engine whose clock only moves on
/// `today` rows. Malformed rows and rejected operations are logged and
/// skipped.
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn replay<R: Read>(reader: R, config: &Config) -> Result<Engine, csv::Error> {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = Engine::builder()
        .config(config)
        .clock(clock.clone())
        .build();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        match result {
            Ok(record) => {
                if let Err(e) = apply(&engine, &clock, &record) {
                    warn!(row = line + 1, op = %record.op, error = %e, "skipping operation");
                }
            }
            Err(e) => {
                warn!(row = line + 1, error = %e, "skipping malformed row");
            }
        }
    }

    Ok(engine)
}

/// Writes one statement row per tenant.
///
/// # CSV Format
///
/// Columns: `tenant, landlord, points, rewards, redemptions, reconciled`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_statements<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for statement in engine.tenant_statements() {
        wtr.serialize(&statement)?;
    }
    wtr.flush()?;
    Ok(())
}
