//! Simple REST API server example for the energy ledger.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /users` - Register a user wallet
//! - `POST /users/{id}/grants` - Grant free or paid energy
//! - `POST /users/{id}/consume` - Spend energy
//! - `GET /users/{id}/breakdown` - Spendable energy by source
//! - `POST /sweep` - Expire overdue grants
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/users \
//!   -H "Content-Type: application/json" -d '{"user_id": 1}'
//!
//! curl -X POST http://localhost:3000/users/1/grants \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": 50, "source": "paid", "order_id": "ord-1"}'
//!
//! curl -X POST http://localhost:3000/users/1/consume \
//!   -H "Content-Type: application/json" -d '{"amount": 10}'
//!
//! curl http://localhost:3000/users/1/breakdown
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use energy_ledger::{
    ConsumeOutcome, EnergyBreakdown, EnergyLedger, EnergySource, LedgerEntry, LedgerError,
    OrderId, SweepSummary, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub user_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub amount: u64,
    pub source: EnergySource,
    pub order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    pub amount: u64,
}

/// Response body for a rejected consumption.
#[derive(Debug, Serialize)]
pub struct InsufficientResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub outcome: ConsumeOutcome,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the ledger.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<EnergyLedger>,
}

// === Error Handling ===

/// Wrapper for converting `LedgerError` into HTTP responses.
pub struct AppError(LedgerError);

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            LedgerError::UnknownUser(_) => (StatusCode::NOT_FOUND, "UNKNOWN_USER"),
            LedgerError::DuplicateUser(_) => (StatusCode::CONFLICT, "DUPLICATE_USER"),
            LedgerError::InvalidAmount => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /users - Register a user wallet.
async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<StatusCode, AppError> {
    state.ledger.register_user(UserId(request.user_id))?;
    Ok(StatusCode::CREATED)
}

/// POST /users/{id}/grants - Grant energy.
async fn grant(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<GrantRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>), AppError> {
    let entry = state.ledger.grant(
        UserId(id),
        request.amount,
        request.source,
        request.order_id.map(OrderId),
    )?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// POST /users/{id}/consume - Spend energy.
async fn consume(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ConsumeRequest>,
) -> Result<Response, AppError> {
    let outcome = state.ledger.consume(UserId(id), request.amount)?;
    if outcome.is_success() {
        return Ok(Json(outcome).into_response());
    }
    Ok((
        StatusCode::PAYMENT_REQUIRED,
        Json(InsufficientResponse {
            message: "Not enough energy. Come back tomorrow or purchase more.",
            outcome,
        }),
    )
        .into_response())
}

/// GET /users/{id}/breakdown - Spendable energy by source.
async fn breakdown(State(state): State<AppState>, Path(id): Path<u64>) -> Json<EnergyBreakdown> {
    Json(state.ledger.breakdown(UserId(id)))
}

/// POST /sweep - Expire overdue grants.
async fn sweep(State(state): State<AppState>) -> Json<SweepSummary> {
    Json(state.ledger.cleanup_expired())
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(register_user))
        .route("/users/{id}/grants", post(grant))
        .route("/users/{id}/consume", post(consume))
        .route("/users/{id}/breakdown", get(breakdown))
        .route("/sweep", post(sweep))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let state = AppState {
        ledger: Arc::new(EnergyLedger::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    tracing::info!("energy ledger API listening on http://127.0.0.1:3000");

    axum::serve(listener, app).await.unwrap();
}
