//! HTTP surface tests: signature enforcement, event handling, linking,
//! status and admin queries.

mod common;

use accessgate::{server, AppState, Config, EventIntake, Ledger, MemoryStore};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::RecordingNotifier;
use hmac::Mac;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with_config(config: Config) -> axum::Router {
    let notifier = RecordingNotifier::new();
    let ledger = Arc::new(Ledger::new(
        Arc::new(MemoryStore::new()),
        notifier,
        config.clone(),
    ));
    let intake = Arc::new(EventIntake::new(config, None));
    accessgate::router(AppState { intake, ledger })
}

fn app() -> axum::Router {
    app_with_config(common::test_config())
}

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = hmac::Hmac::<sha2::Sha512>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn charge_success(reference: &str, email: &str, amount_minor: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "customer": { "email": email },
            "amount": amount_minor,
            "metadata": {},
        }
    }))
    .unwrap()
}

async fn post_json(app: &axum::Router, uri: &str, body: Vec<u8>) -> (StatusCode, Value) {
    post_with_headers(app, uri, body, &[]).await
}

async fn post_with_headers(
    app: &axum::Router,
    uri: &str,
    body: Vec<u8>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn get_json(app: &axum::Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn webhook_grants_and_reports_ok() {
    let app = app();
    let (status, body) = post_json(
        &app,
        "/webhook/paystack",
        charge_success("R1", "a@x.com", 5_000_000),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["identity"], "a@x.com");
}

#[tokio::test]
async fn webhook_ignores_other_event_kinds() {
    let app = app();
    let body = serde_json::to_vec(&json!({ "event": "transfer.success", "data": {} })).unwrap();
    let (status, body) = post_json(&app, "/webhook/paystack", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn webhook_missing_fields_is_bad_request() {
    let app = app();
    let body = serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": { "amount": 100 }
    }))
    .unwrap();
    let (status, _) = post_json(&app, "/webhook/paystack", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_malformed_json_is_bad_request() {
    let app = app();
    let (status, _) = post_json(&app, "/webhook/paystack", b"{not json".to_vec()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_signature_enforced_when_secret_set() {
    let mut config = common::test_config();
    config.webhook_secret = Some("s3cret".to_string());
    let app = app_with_config(config);

    let body = charge_success("R1", "a@x.com", 5_000_000);

    // Valid signature.
    let sig = sign("s3cret", &body);
    let (status, _) = post_with_headers(
        &app,
        "/webhook/paystack",
        body.clone(),
        &[(server::SIGNATURE_HEADER, sig.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Wrong signature.
    let bad = sign("other", &body);
    let (status, _) = post_with_headers(
        &app,
        "/webhook/paystack",
        body.clone(),
        &[(server::SIGNATURE_HEADER, bad.as_str())],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Missing signature.
    let (status, _) = post_json(&app, "/webhook/paystack", body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_duplicate_delivery_returns_ok_without_extending() {
    let app = app();
    let body = charge_success("R1", "a@x.com", 5_000_000);
    let (status, _) = post_json(&app, "/webhook/paystack", body.clone()).await;
    assert_eq!(status, StatusCode::OK);

    // Redelivery: still OK (the gateway must stop retrying), no extension.
    let (status, reply) = post_json(&app, "/webhook/paystack", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "ok");
}

#[tokio::test]
async fn link_flow_and_status_query() {
    let app = app();
    post_json(
        &app,
        "/webhook/paystack",
        charge_success("R1", "a@x.com", 5_000_000),
    )
    .await;

    let link = serde_json::to_vec(&json!({ "chat_id": 555, "reference": "R1" })).unwrap();
    let (status, body) = post_json(&app, "/link", link).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "linked");
    assert_eq!(body["identity"], "a@x.com");

    let (status, body) = get_json(&app, "/status/555", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identity"], "a@x.com");
    assert_eq!(body["external_chat_id"], 555);

    let (status, _) = get_json(&app, "/status/556", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn link_accepts_legacy_field_names() {
    let app = app();
    post_json(
        &app,
        "/webhook/paystack",
        charge_success("R1", "a@x.com", 5_000_000),
    )
    .await;

    let link =
        serde_json::to_vec(&json!({ "telegram_id": 555, "paystack_reference": "R1" })).unwrap();
    let (status, body) = post_json(&app, "/link", link).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "linked");
}

#[tokio::test]
async fn link_unknown_reference_is_404() {
    let app = app();
    let link = serde_json::to_vec(&json!({ "chat_id": 555, "reference": "nope" })).unwrap();
    let (status, _) = post_json(&app, "/link", link).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn link_missing_fields_is_400() {
    let app = app();
    let link = serde_json::to_vec(&json!({ "chat_id": 555 })).unwrap();
    let (status, _) = post_json(&app, "/link", link).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn link_duplicate_chat_is_conflict() {
    let app = app();
    post_json(
        &app,
        "/webhook/paystack",
        charge_success("R1", "a@x.com", 5_000_000),
    )
    .await;
    post_json(
        &app,
        "/webhook/paystack",
        charge_success("R2", "b@x.com", 5_000_000),
    )
    .await;

    let link = serde_json::to_vec(&json!({ "chat_id": 555, "reference": "R1" })).unwrap();
    let (status, _) = post_json(&app, "/link", link).await;
    assert_eq!(status, StatusCode::OK);

    let link = serde_json::to_vec(&json!({ "chat_id": 555, "reference": "R2" })).unwrap();
    let (status, _) = post_json(&app, "/link", link).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_endpoint_open_without_key_configured() {
    let app = app();
    post_json(
        &app,
        "/webhook/paystack",
        charge_success("R1", "a@x.com", 5_000_000),
    )
    .await;

    let (status, body) = get_json(&app, "/admin/records", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("a@x.com").is_some());
}

#[tokio::test]
async fn admin_endpoint_guarded_when_key_configured() {
    let mut config = common::test_config();
    config.admin_key = Some("top-secret".to_string());
    let app = app_with_config(config);

    let (status, _) = get_json(&app, "/admin/records", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_json(&app, "/admin/records", &[(server::ADMIN_KEY_HEADER, "wrong")]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_json(
        &app,
        "/admin/records",
        &[(server::ADMIN_KEY_HEADER, "top-secret")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn plan_metadata_beats_amount_threshold() {
    let app = app();
    let body = serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": {
            "reference": "R1",
            "customer": { "email": "a@x.com" },
            "amount": 100,
            "metadata": { "plan_type": "short_cycle" },
        }
    }))
    .unwrap();
    post_json(&app, "/webhook/paystack", body).await;

    let (_, records) = get_json(&app, "/admin/records", &[]).await;
    assert_eq!(records["a@x.com"]["plan"], "short_cycle");
}
