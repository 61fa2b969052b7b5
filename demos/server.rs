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

//! REST API server example for the settlement service.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /transactions` - Register a transaction to be settled
//! - `GET /transactions/{id}` - Transaction summary with paid total and balance
//! - `POST /transactions/{id}/settlements` - Record a settlement
//! - `GET /transactions/{id}/settlements` - Settlement history, most recent first
//! - `POST /cashiers` - Add a cashier to the directory
//!
//! ## Example Usage
//!
//! ```bash
//! # Register a sale of 100.00
//! curl -X POST http://localhost:3000/transactions \
//!   -H "Content-Type: application/json" \
//!   -d '{"id": 1, "customer_id": 7, "total_amount": "100.00"}'
//!
//! # Pay 40.00 in cash
//! curl -X POST http://localhost:3000/transactions/1/settlements \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": "40.00", "payment_mode": "cash", "cashier_id": 3}'
//!
//! # History
//! curl http://localhost:3000/transactions/1/settlements
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use escashop_settlement::{
    CashierId, ChannelPublisher, CustomerId, MemoryStore, SettlementConfig, SettlementError,
    SettlementOutcome, SettlementRecord, SettlementRequest, SettlementService, Transaction,
    TransactionId, TransactionSummary,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub type Service = SettlementService<MemoryStore, ChannelPublisher>;

// === Request/Response DTOs ===

/// Request body for registering a transaction.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub id: u64,
    pub customer_id: u32,
    pub total_amount: Decimal,
}

/// Decimal text of an amount sent as a JSON string or a JSON number.
///
/// Numbers are taken from the raw request text so they never pass through
/// `f64`.
fn amount_text(amount: &RawValue) -> Result<String, SettlementError> {
    let raw = amount.get().trim();
    if raw.starts_with('"') {
        serde_json::from_str(raw)
            .map_err(|e| SettlementError::InvalidArgument(format!("amount {raw} is not valid: {e}")))
    } else {
        Ok(raw.to_string())
    }
}

/// Request body for recording a settlement.
///
/// ```json
/// {"amount": "40.00", "payment_mode": "cash", "cashier_id": 3}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSettlementRequest {
    pub amount: Box<RawValue>,
    pub payment_mode: String,
    pub cashier_id: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCashierRequest {
    pub id: u32,
    pub name: String,
}

/// Response body for errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the settlement service.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
}

// === Error Handling ===

/// Wrapper for converting service failures into HTTP responses.
pub enum AppError {
    Settlement(SettlementError),
    /// The blocking worker running the unit of work did not finish.
    Worker(String),
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        AppError::Settlement(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Settlement(err) => {
                let status = match err {
                    SettlementError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                    SettlementError::NotFound(_) => StatusCode::NOT_FOUND,
                    SettlementError::DuplicateTransaction(_) => StatusCode::CONFLICT,
                    SettlementError::OverpaymentRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    SettlementError::PersistenceFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, err.code(), err.to_string())
            }
            AppError::Worker(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                message.clone(),
            ),
        };

        if status.is_server_error() {
            error!(code, error = %message, "request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /transactions - Register a transaction.
async fn create_transaction(
    State(state): State<AppState>,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let transaction = Transaction::new(
        TransactionId(request.id),
        CustomerId(request.customer_id),
        request.total_amount,
    )?;
    state.service.store().insert_transaction(transaction.clone())?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// GET /transactions/{id} - Transaction summary.
async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<TransactionSummary>, AppError> {
    Ok(Json(state.service.summary(TransactionId(id))?))
}

/// POST /transactions/{id}/settlements - Record a settlement.
///
/// The unit of work runs on the blocking pool so a dropped connection
/// cannot abandon it halfway.
async fn create_settlement(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(body): Json<CreateSettlementRequest>,
) -> Result<(StatusCode, Json<SettlementOutcome>), AppError> {
    let request = SettlementRequest::parse(
        TransactionId(id),
        &amount_text(&body.amount)?,
        &body.payment_mode,
        CashierId(body.cashier_id),
    )?;

    let service = Arc::clone(&state.service);
    let outcome = tokio::task::spawn_blocking(move || service.create_settlement(request))
        .await
        .map_err(|e| AppError::Worker(e.to_string()))??;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /transactions/{id}/settlements - Settlement history.
async fn list_settlements(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<SettlementRecord>>, AppError> {
    Ok(Json(state.service.get_settlements(TransactionId(id))?))
}

/// POST /cashiers - Add or rename a cashier.
async fn create_cashier(
    State(state): State<AppState>,
    Json(request): Json<CreateCashierRequest>,
) -> StatusCode {
    state
        .service
        .store()
        .register_cashier(CashierId(request.id), request.name);
    StatusCode::NO_CONTENT
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/transactions", post(create_transaction))
        .route("/transactions/{id}", get(get_transaction))
        .route(
            "/transactions/{id}/settlements",
            post(create_settlement).get(list_settlements),
        )
        .route("/cashiers", post(create_cashier))
        .with_state(state)
}

/// Logs every change event, standing in for a real-time gateway.
pub fn spawn_event_logger(publisher: &ChannelPublisher) {
    let events = publisher.subscribe();
    std::thread::spawn(move || {
        for event in events {
            info!(
                event = event.name(),
                transaction_id = %event.transaction_id(),
                "notification published"
            );
        }
    });
}

// === Main ===

#[derive(Parser, Debug)]
#[command(name = "settlement-server")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "SETTLEMENT_ADDR", default_value = "127.0.0.1:3000")]
    addr: String,

    /// Tag every settlement with a request ID span
    #[arg(long, env = "ENABLE_SETTLEMENT_TRACING")]
    trace_settlements: bool,

    /// Longest wait for a busy transaction, in milliseconds
    #[arg(
        long,
        env = "SETTLEMENT_LOCK_TIMEOUT_MS",
        default_value_t = 5000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    lock_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SettlementConfig::default()
        .with_tracing(args.trace_settlements)
        .with_lock_timeout(Duration::from_millis(args.lock_timeout_ms));
    let store = Arc::new(MemoryStore::with_lock_timeout(config.lock_timeout));
    let publisher = Arc::new(ChannelPublisher::new());
    spawn_event_logger(&publisher);

    let state = AppState {
        service: Arc::new(SettlementService::with_config(store, publisher, config)),
    };
    let app = create_router(state);

    let listener = TcpListener::bind(&args.addr).await?;
    info!(addr = %listener.local_addr()?, "settlement API server running");

    axum::serve(listener, app).await?;
    Ok(())
}
