//! REST API server example for the rent ledger.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! The acting user is passed in the `x-user-id` header.
//!
//! - `POST /users` - Register a tenant or landlord
//! - `POST /plans` - Landlord proposes a rent plan
//! - `GET  /plans` - Plans the actor is party to
//! - `POST /plans/{id}/accept` - Tenant accepts; returns the deposit checkout
//! - `POST /plans/{id}/reject` - Tenant rejects
//! - `POST /plans/{id}/cancel` - Landlord cancels
//! - `POST /bills` - Landlord issues a bill
//! - `GET  /bills` - Bills the actor is party to
//! - `POST /bills/{id}/pay` - Tenant opens a bill checkout
//! - `GET  /points` - Tenant points balance
//! - `GET  /rewards` - Tenant reward history
//! - `POST /redemptions` - Spend points on a shop item
//! - `GET  /budgets/{period}` / `PUT /budgets/{period}` - Read or set a budget
//! - `GET  /budgets/{period}/progress` - Spend against the budget
//! - `POST /expenses` - Record an expense
//! - `POST /streak/evaluate` - Run today's budget streak check
//! - `POST /webhooks/payment` - Payment processor callback
//! - `POST /webhooks/signing` - E-signature callback
//! - `GET  /anomalies` - Drain the reconciliation anomaly queue
//!
//! ## Example
//!
//! ```bash
//! # Register a landlord and a tenant
//! curl -X POST http://localhost:3000/users \
//!   -H "Content-Type: application/json" \
//!   -d '{"role": "landlord", "name": "Lee", "email": "lee@example.com"}'
//!
//! # Propose a plan as user 1
//! curl -X POST http://localhost:3000/plans \
//!   -H "Content-Type: application/json" -H "x-user-id: 1" \
//!   -d '{"tenantId": 2, "monthlyRent": "1500", "deposit": "3000", "durationMonths": 12}'
//!
//! # Deliver a payment completion
//! curl -X POST http://localhost:3000/webhooks/payment \
//!   -d '{"eventType": "payment.completed", "intentId": "pi_...", "metadata": {"planId": 1}}'
//! ```

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use rent_ledger::logging::init_tracing;
use rent_ledger::{
    Bill, BillId, BillKind, Budget, BudgetPeriod, BudgetProgress, CategoryShare, CheckoutIntent,
    Config, Engine, ErrorKind, LedgerError, NewBill, PlanId, PlanTerms, ReconciliationAnomaly,
    RedemptionReceipt, RentPlan, RequestId, Reward, Role, ShopItem, SigningEvent, StreakOutcome,
    UserId, WebhookError, WebhookOutcome,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub role: Role,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeRequest {
    pub tenant_id: UserId,
    pub monthly_rent: Decimal,
    pub deposit: Decimal,
    pub duration_months: u32,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillRequest {
    pub tenant_id: UserId,
    pub kind: BillKind,
    pub amount: Decimal,
    pub due_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub item_id: String,
    pub item_name: String,
    pub cost: u64,
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BudgetRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub categories: Vec<CategoryShare>,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseRequest {
    pub amount: Decimal,
    pub category: String,
    pub date: NaiveDate,
}

/// Response body carrying a newly created id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Created {
    pub id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PointsResponse {
    pub tenant: UserId,
    pub balance: u64,
}

/// Response body for errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the ledger engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting ledger and request errors into HTTP responses.
pub enum AppError {
    Ledger(LedgerError),
    MissingActor,
    Malformed(WebhookError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Ledger(err)
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        AppError::Malformed(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error) = match self {
            AppError::Ledger(err) => {
                let (status, code) = match err.kind() {
                    ErrorKind::Validation => (StatusCode::BAD_REQUEST, "VALIDATION"),
                    ErrorKind::Authorization => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                    ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    ErrorKind::InvalidState => match err {
                        LedgerError::InsufficientPoints { .. } => {
                            (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_POINTS")
                        }
                        _ => (StatusCode::CONFLICT, "INVALID_STATE"),
                    },
                    ErrorKind::Gateway => (StatusCode::BAD_GATEWAY, "GATEWAY"),
                };
                (status, code, err.to_string())
            }
            AppError::MissingActor => (
                StatusCode::UNAUTHORIZED,
                "MISSING_ACTOR",
                "x-user-id header is required".to_string(),
            ),
            AppError::Malformed(err) => (StatusCode::BAD_REQUEST, "MALFORMED", err.to_string()),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// The user making the request, from the `x-user-id` header.
pub struct Actor(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .map(|id| Actor(UserId(id)))
            .ok_or(AppError::MissingActor)
    }
}

// === Handlers ===

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Created>), AppError> {
    let id = state
        .engine
        .register_user(request.role, &request.name, &request.email)?;
    Ok((StatusCode::CREATED, Json(Created { id: id.0 })))
}

async fn propose_plan(
    State(state): State<AppState>,
    Actor(landlord): Actor,
    Json(request): Json<ProposeRequest>,
) -> Result<(StatusCode, Json<Created>), AppError> {
    let terms = PlanTerms {
        monthly_rent: request.monthly_rent,
        deposit: request.deposit,
        duration_months: request.duration_months,
        start_date: request.start_date,
    };
    let id = state
        .engine
        .propose_plan(landlord, request.tenant_id, terms)?;
    Ok((StatusCode::CREATED, Json(Created { id: id.0 })))
}

async fn list_plans(State(state): State<AppState>, Actor(user): Actor) -> Json<Vec<RentPlan>> {
    Json(state.engine.plans_for(user))
}

async fn accept_plan(
    State(state): State<AppState>,
    Actor(tenant): Actor,
    Path(id): Path<u64>,
) -> Result<Json<CheckoutIntent>, AppError> {
    Ok(Json(state.engine.accept_plan(tenant, PlanId(id))?))
}

async fn reject_plan(
    State(state): State<AppState>,
    Actor(tenant): Actor,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    state.engine.reject_plan(tenant, PlanId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_plan(
    State(state): State<AppState>,
    Actor(landlord): Actor,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    state.engine.cancel_plan(landlord, PlanId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_bill(
    State(state): State<AppState>,
    Actor(landlord): Actor,
    Json(request): Json<BillRequest>,
) -> Result<(StatusCode, Json<Created>), AppError> {
    let bill = NewBill::new(request.kind, request.amount, &request.due_date)?;
    let id = state
        .engine
        .create_bill(landlord, request.tenant_id, bill)?;
    Ok((StatusCode::CREATED, Json(Created { id: id.0 })))
}

async fn list_bills(State(state): State<AppState>, Actor(user): Actor) -> Json<Vec<Bill>> {
    Json(state.engine.bills_for(user))
}

async fn pay_bill(
    State(state): State<AppState>,
    Actor(tenant): Actor,
    Path(id): Path<u64>,
) -> Result<Json<CheckoutIntent>, AppError> {
    Ok(Json(state.engine.initiate_bill_payment(tenant, BillId(id))?))
}

async fn points(
    State(state): State<AppState>,
    Actor(tenant): Actor,
) -> Result<Json<PointsResponse>, AppError> {
    let balance = state.engine.points_balance(tenant)?;
    Ok(Json(PointsResponse { tenant, balance }))
}

async fn rewards(
    State(state): State<AppState>,
    Actor(tenant): Actor,
) -> Result<Json<Vec<Reward>>, AppError> {
    Ok(Json(state.engine.rewards(tenant)?))
}

async fn redeem(
    State(state): State<AppState>,
    Actor(tenant): Actor,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<RedemptionReceipt>, AppError> {
    let item = ShopItem {
        id: request.item_id,
        name: request.item_name,
        cost: request.cost,
    };
    let receipt = state
        .engine
        .redeem(tenant, &item, RequestId(request.request_id))?;
    Ok(Json(receipt))
}

async fn get_budget(
    State(state): State<AppState>,
    Actor(tenant): Actor,
    Path(period): Path<String>,
) -> Result<Json<Budget>, AppError> {
    let period: BudgetPeriod = period.parse()?;
    Ok(Json(state.engine.budget(tenant, period)?))
}

async fn put_budget(
    State(state): State<AppState>,
    Actor(tenant): Actor,
    Path(period): Path<String>,
    Json(request): Json<BudgetRequest>,
) -> Result<Json<Budget>, AppError> {
    let period: BudgetPeriod = period.parse()?;
    let budget = state
        .engine
        .set_budget(tenant, period, request.amount, &request.categories)?;
    Ok(Json(budget))
}

async fn budget_progress(
    State(state): State<AppState>,
    Actor(tenant): Actor,
    Path(period): Path<String>,
) -> Result<Json<BudgetProgress>, AppError> {
    let period: BudgetPeriod = period.parse()?;
    Ok(Json(state.engine.budget_progress(tenant, period)?))
}

async fn record_expense(
    State(state): State<AppState>,
    Actor(tenant): Actor,
    Json(request): Json<ExpenseRequest>,
) -> Result<(StatusCode, Json<Created>), AppError> {
    let id = state
        .engine
        .record_expense(tenant, request.amount, &request.category, request.date)?;
    Ok((StatusCode::CREATED, Json(Created { id: id.0 })))
}

async fn evaluate_streak(
    State(state): State<AppState>,
    Actor(tenant): Actor,
) -> Result<Json<StreakOutcome>, AppError> {
    Ok(Json(state.engine.evaluate_streak(tenant)?))
}

/// Always 200 once the body parses; the outcome says what happened.
async fn payment_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, AppError> {
    Ok(Json(state.engine.handle_payment_webhook(&body)?))
}

async fn signing_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let event = SigningEvent::from_slice(&body)?;
    state.engine.handle_signing_event(&event);
    Ok(StatusCode::OK)
}

async fn drain_anomalies(State(state): State<AppState>) -> Json<Vec<ReconciliationAnomaly>> {
    Json(state.engine.anomalies().drain())
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(register))
        .route("/plans", post(propose_plan).get(list_plans))
        .route("/plans/{id}/accept", post(accept_plan))
        .route("/plans/{id}/reject", post(reject_plan))
        .route("/plans/{id}/cancel", post(cancel_plan))
        .route("/bills", post(create_bill).get(list_bills))
        .route("/bills/{id}/pay", post(pay_bill))
        .route("/points", get(points))
        .route("/rewards", get(rewards))
        .route("/redemptions", post(redeem))
        .route("/budgets/{period}", get(get_budget).put(put_budget))
        .route("/budgets/{period}/progress", get(budget_progress))
        .route("/expenses", post(record_expense))
        .route("/streak/evaluate", post(evaluate_streak))
        .route("/webhooks/payment", post(payment_webhook))
        .route("/webhooks/signing", post(signing_webhook))
        .route("/anomalies", get(drain_anomalies))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };
    let engine = match Engine::from_config(&config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let state = AppState {
        engine: Arc::new(engine),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Rent ledger API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST /users              - Register a user");
    println!("  POST /plans              - Propose a rent plan");
    println!("  POST /bills              - Issue a bill");
    println!("  POST /webhooks/payment   - Payment processor callback");
    println!("  GET  /anomalies          - Drain reconciliation anomalies");

    axum::serve(listener, app).await.unwrap();
}
