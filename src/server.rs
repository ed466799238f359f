//! HTTP surface: a thin translation layer over intake and ledger.
//!
//! Handlers parse, delegate, and map errors onto statuses; no business
//! logic lives here.

use crate::{Error, EventIntake, GrantAction, IntakeOutcome, Ledger};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<EventIntake>,
    pub ledger: Arc<Ledger>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook/paystack", post(webhook))
        .route("/link", post(link))
        .route("/status/:chat_id", get(status))
        .route("/admin/records", get(admin_records))
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::ReferenceNotFound(_) | Error::NotFound => StatusCode::NOT_FOUND,
            Error::ChatAlreadyLinked(_) => StatusCode::CONFLICT,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            // Oracle says no: fail closed, caller's payment is not trusted.
            Error::VerificationFailed(_) => StatusCode::BAD_REQUEST,
            Error::VerificationUnavailable(_) => StatusCode::BAD_GATEWAY,
            Error::Notify(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Unauthorized deliberately carries no detail.
        let body = match &self {
            Error::Unauthorized => json!({ "error": "unauthorized" }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

async fn health() -> &'static str {
    "accessgate running"
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    state.intake.verify_signature(&body, signature)?;

    match state.intake.normalize(&body).await? {
        IntakeOutcome::Ignored { event } => {
            tracing::debug!(%event, "ignoring non-payment event");
            Ok(Json(json!({ "status": "ignored" })).into_response())
        }
        IntakeOutcome::Payment(payment) => {
            let (record, action) = state
                .ledger
                .grant_or_renew(&payment.identity, payment.plan, &payment.reference)
                .await?;
            if action == GrantAction::Unchanged {
                tracing::info!(
                    identity = %record.identity,
                    reference = %payment.reference,
                    "duplicate payment event, no-op"
                );
            }
            Ok(Json(json!({ "status": "ok", "identity": record.identity })).into_response())
        }
    }
}

#[derive(Deserialize)]
struct LinkRequest {
    // Both field spellings have callers in the wild.
    #[serde(alias = "telegram_id")]
    chat_id: Option<i64>,
    #[serde(alias = "paystack_reference")]
    reference: Option<String>,
}

async fn link(
    State(state): State<AppState>,
    Json(req): Json<LinkRequest>,
) -> Result<Response, Error> {
    let chat_id = req
        .chat_id
        .ok_or_else(|| Error::Validation("chat_id is required".to_string()))?;
    let reference = req
        .reference
        .filter(|r| !r.is_empty())
        .ok_or_else(|| Error::Validation("reference is required".to_string()))?;

    let record = state.ledger.link_identity(chat_id, &reference).await?;
    Ok(Json(json!({ "status": "linked", "identity": record.identity })).into_response())
}

async fn status(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> Result<Response, Error> {
    let record = state.ledger.query_by_chat(chat_id).await?;
    Ok(Json(record).into_response())
}

async fn admin_records(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, Error> {
    if let Some(expected) = state.ledger.config().admin_key.as_deref() {
        let presented = headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let ok: bool = expected.as_bytes().ct_eq(presented.as_bytes()).into();
        if !ok {
            return Err(Error::Unauthorized);
        }
    }
    let records = state.ledger.records().await?;
    Ok(Json(records).into_response())
}
