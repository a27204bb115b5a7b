//! # Relay API
//!
//! A thin HTTP relay in front of the ledger. It never sees a secret key:
//! clients sign on their own device and post the signed envelope here.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Description                          |
//! |--------|------------------------|--------------------------------------|
//! | GET    | `/health`              | Liveness probe                       |
//! | GET    | `/accounts/:id`        | Balances and sequence number         |
//! | POST   | `/transactions`        | Submit a signed base64 XDR envelope  |
//! | GET    | `/transactions/:hash`  | Submission outcome by hash           |
//! | GET    | `/metrics`             | Prometheus metrics                   |
//!
//! ## Error mapping
//!
//! | Condition                                      | Status |
//! |------------------------------------------------|--------|
//! | Malformed id, hash or envelope; expired; rejected | 400 |
//! | Unknown account or transaction                 | 404    |
//! | Envelope already landed as a failed transaction | 409   |
//! | Unexpected ledger response                     | 502    |
//! | Ledger unreachable after retries               | 503    |

use axum::{
    extract::{FromRef, Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ilede_wallet::transaction::TransactionHash;
use ilede_wallet::{AccountId, BalanceReader, Network, ReadError, SignedEnvelope, SubmitError, Submitter};

use crate::metrics::{metrics_handler, SharedMetrics};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    /// Envelopes are decoded and hashed for this network only.
    pub network: Network,
    pub reader: Arc<BalanceReader>,
    pub submitter: Arc<Submitter>,
    pub metrics: SharedMetrics,
}

impl FromRef<AppState> for SharedMetrics {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/accounts/:id", get(account_handler))
        .route("/transactions", post(submit_handler))
        .route("/transactions/:hash", get(transaction_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /transactions`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Base64 XDR `TransactionEnvelope`.
    #[serde(alias = "signedTransactionXDR")]
    pub envelope_xdr: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub network: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorResponse {
        error: message.into(),
        hash: None,
    };
    (status, Json(body)).into_response()
}

fn error_for(status: StatusCode, message: impl Into<String>, hash: &TransactionHash) -> Response {
    let body = ErrorResponse {
        error: message.into(),
        hash: Some(hash.to_string()),
    };
    (status, Json(body)).into_response()
}

fn read_error(err: ReadError) -> Response {
    match err {
        ReadError::AccountNotFound(_) => error(StatusCode::NOT_FOUND, err.to_string()),
        ReadError::NetworkUnavailable { .. } => {
            error(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        ReadError::Protocol(_) => error(StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        version: state.version.clone(),
        network: state.network.name().to_string(),
    })
}

/// `GET /accounts/:id` returns the account snapshot as the ledger reports
/// it now. Nothing is cached.
async fn account_handler(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    let account: AccountId = match id.parse() {
        Ok(account) => account,
        Err(_) => return error(StatusCode::BAD_REQUEST, format!("invalid account id: {id}")),
    };
    state.metrics.account_reads_total.inc();
    match state.reader.fetch(&account).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => read_error(err),
    }
}

/// `POST /transactions` relays a client-signed envelope.
///
/// The envelope must decode for this relay's network and carry a signature
/// from its source account; anything else would only bounce off the ledger.
async fn submit_handler(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Response {
    let envelope = match SignedEnvelope::from_xdr_base64(&request.envelope_xdr, state.network.clone())
    {
        Ok(envelope) => envelope,
        Err(err) => {
            state.metrics.record_submission("invalid");
            return error(StatusCode::BAD_REQUEST, format!("invalid envelope: {err}"));
        }
    };
    let hash = envelope.hash();
    let source = *envelope.envelope().source_account();
    if !envelope.is_signed_by(&source) {
        state.metrics.record_submission("invalid");
        return error_for(
            StatusCode::BAD_REQUEST,
            "envelope is not signed by its source account",
            &hash,
        );
    }

    let started = Instant::now();
    let result = state.submitter.submit(&envelope).await;
    state
        .metrics
        .submission_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(result) if result.is_accepted() => {
            state
                .metrics
                .record_submission(if result.duplicate { "duplicate" } else { "accepted" });
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(result) => {
            state.metrics.record_submission("rejected");
            (StatusCode::BAD_REQUEST, Json(result)).into_response()
        }
        Err(err) => {
            let status = match &err {
                SubmitError::EnvelopeExpired { .. } => {
                    state.metrics.record_submission("invalid");
                    StatusCode::BAD_REQUEST
                }
                SubmitError::DuplicateSubmission { .. } => {
                    state.metrics.record_submission("rejected");
                    StatusCode::CONFLICT
                }
                SubmitError::NetworkUnavailable { .. } => {
                    state.metrics.record_submission("error");
                    StatusCode::SERVICE_UNAVAILABLE
                }
                SubmitError::Protocol(_) => {
                    state.metrics.record_submission("error");
                    StatusCode::BAD_GATEWAY
                }
            };
            error_for(status, err.to_string(), &hash)
        }
    }
}

/// `GET /transactions/:hash` resolves a submission whose reply was lost.
async fn transaction_handler(Path(hash): Path<String>, State(state): State<AppState>) -> Response {
    let hash: TransactionHash = match hash.parse() {
        Ok(hash) => hash,
        Err(_) => return error(StatusCode::BAD_REQUEST, format!("invalid transaction hash: {hash}")),
    };
    match state.submitter.status(&hash).await {
        Ok(Some(result)) => (StatusCode::OK, Json(result)).into_response(),
        Ok(None) => error_for(StatusCode::NOT_FOUND, "transaction not found", &hash),
        Err(err @ SubmitError::NetworkUnavailable { .. }) => {
            error_for(StatusCode::SERVICE_UNAVAILABLE, err.to_string(), &hash)
        }
        Err(err) => error_for(StatusCode::BAD_GATEWAY, err.to_string(), &hash),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
