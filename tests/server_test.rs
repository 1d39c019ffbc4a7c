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

//! HTTP API integration tests.
//!
//! Spins up the REST handlers on an ephemeral port and drives them with
//! concurrent HTTP clients to check that the ledger stays consistent behind
//! an async server.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use energy_ledger::{
    EnergyBreakdown, EnergyLedger, EnergySource, LedgerEntry, LedgerError, OrderId, SweepSummary,
    UserId,
};
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === DTOs (duplicated from the demo server for test isolation) ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub user_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRequest {
    pub amount: u64,
    pub source: EnergySource,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeRequest {
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Server Setup ===

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<EnergyLedger>,
}

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

async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<StatusCode, AppError> {
    state.ledger.register_user(UserId(request.user_id))?;
    Ok(StatusCode::CREATED)
}

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

async fn consume(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ConsumeRequest>,
) -> Result<Response, AppError> {
    let outcome = state.ledger.consume(UserId(id), request.amount)?;
    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::PAYMENT_REQUIRED
    };
    Ok((status, Json(outcome)).into_response())
}

async fn breakdown(State(state): State<AppState>, Path(id): Path<u64>) -> Json<EnergyBreakdown> {
    Json(state.ledger.breakdown(UserId(id)))
}

async fn sweep(State(state): State<AppState>) -> Json<SweepSummary> {
    Json(state.ledger.cleanup_expired())
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(register_user))
        .route("/users/{id}/grants", post(grant))
        .route("/users/{id}/consume", post(consume))
        .route("/users/{id}/breakdown", get(breakdown))
        .route("/sweep", post(sweep))
        .with_state(state)
}

/// Test server that binds to an ephemeral port.
struct TestServer {
    base_url: String,
    ledger: Arc<EnergyLedger>,
}

impl TestServer {
    async fn new() -> Self {
        let ledger = Arc::new(EnergyLedger::new());
        let state = AppState {
            ledger: ledger.clone(),
        };

        let app = create_router(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to be ready by polling with retries
        let client = Client::new();
        let health_url = format!("{}/users/0/breakdown", base_url);
        for _ in 0..50 {
            match client.get(&health_url).send().await {
                Ok(_) => break,
                Err(_) => tokio::time::sleep(tokio::time::Duration::from_millis(50)).await,
            }
        }

        TestServer { base_url, ledger }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

// === Tests ===
// These tests are ignored in CI due to connection issues on some platforms.
// Run manually with: cargo test --test server_test -- --ignored

/// Register, grant, spend and read back through HTTP.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn grant_and_consume_round_trip() {
    let server = TestServer::new().await;
    let client = Client::new();

    let response = client
        .post(server.url("/users"))
        .json(&RegisterRequest { user_id: 1 })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .post(server.url("/users/1/grants"))
        .json(&GrantRequest {
            amount: 10,
            source: EnergySource::Free,
            order_id: None,
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let entry: serde_json::Value = response.json().await.unwrap();
    assert_eq!(entry["source"], "free");
    assert_eq!(entry["initialAmount"], 10);

    client
        .post(server.url("/users/1/grants"))
        .json(&GrantRequest {
            amount: 15,
            source: EnergySource::Paid,
            order_id: Some("ord-1".to_string()),
        })
        .send()
        .await
        .unwrap();

    let response = client
        .post(server.url("/users/1/consume"))
        .json(&ConsumeRequest { amount: 12 })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: serde_json::Value = response.json().await.unwrap();
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["newBalance"], 13);
    assert_eq!(outcome["consumedFrom"].as_array().unwrap().len(), 2);

    let breakdown: serde_json::Value = client
        .get(server.url("/users/1/breakdown"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(breakdown["freeEnergy"], 0);
    assert_eq!(breakdown["paidEnergy"], 13);
    assert_eq!(breakdown["entryCount"], 1);
}

/// Rejections and errors map to their HTTP status codes.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn failures_map_to_status_codes() {
    let server = TestServer::new().await;
    let client = Client::new();

    client
        .post(server.url("/users"))
        .json(&RegisterRequest { user_id: 1 })
        .send()
        .await
        .unwrap();

    let response = client
        .post(server.url("/users"))
        .json(&RegisterRequest { user_id: 1 })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(server.url("/users/9/grants"))
        .json(&GrantRequest {
            amount: 5,
            source: EnergySource::Free,
            order_id: None,
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.code, "UNKNOWN_USER");

    let response = client
        .post(server.url("/users/1/consume"))
        .json(&ConsumeRequest { amount: 0 })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(server.url("/users/1/consume"))
        .json(&ConsumeRequest { amount: 5 })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let outcome: serde_json::Value = response.json().await.unwrap();
    assert_eq!(outcome["success"], false);
    assert_eq!(outcome["error"], "Insufficient energy");
    assert_eq!(outcome["current"], 0);
    assert_eq!(outcome["required"], 5);
}

/// Concurrent HTTP consumers on one user never overspend.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_consumers_single_user() {
    let server = TestServer::new().await;
    let client = Client::new();

    const GRANTED: u64 = 200;
    const REQUESTS: usize = 300;

    server.ledger.register_user(UserId(1)).unwrap();
    server
        .ledger
        .grant(UserId(1), GRANTED / 2, EnergySource::Free, None)
        .unwrap();
    server
        .ledger
        .grant(UserId(1), GRANTED / 2, EnergySource::Paid, None)
        .unwrap();

    let requests = (0..REQUESTS).map(|_| {
        let client = client.clone();
        let url = server.url("/users/1/consume");
        async move {
            client
                .post(url)
                .json(&ConsumeRequest { amount: 1 })
                .send()
                .await
                .unwrap()
                .status()
        }
    });
    let statuses = join_all(requests).await;

    let ok = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let rejected = statuses
        .iter()
        .filter(|s| **s == StatusCode::PAYMENT_REQUIRED)
        .count();
    assert_eq!(ok as u64, GRANTED);
    assert_eq!(rejected, REQUESTS - GRANTED as usize);
    assert_eq!(server.ledger.balance(UserId(1)).unwrap(), 0);
}

/// The sweep endpoint reports nothing to expire on fresh grants.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn sweep_on_fresh_grants_is_noop() {
    let server = TestServer::new().await;
    let client = Client::new();

    server.ledger.register_user(UserId(1)).unwrap();
    server
        .ledger
        .grant(UserId(1), 10, EnergySource::Free, None)
        .unwrap();

    let summary: serde_json::Value = client
        .post(server.url("/sweep"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["cleanedEntries"], 0);
    assert_eq!(summary["totalExpired"], 0);
    assert_eq!(server.ledger.balance(UserId(1)).unwrap(), 10);
}
