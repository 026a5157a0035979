//! Signed webhook ingestion end to end.

use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{start_bridge, test_config, NOW, WEBHOOK_SECRET};

fn message(id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "message_created",
        "id": id,
        "account": { "id": 1 },
        "conversation": { "id": 77 },
        "content": "Quero remarcar minha consulta",
        "message_type": "incoming",
        "sender": { "name": "Paciente", "email": "paciente@example.com" }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_same_event_twice_is_processed_once() {
    let mut bridge = start_bridge(test_config()).await;
    let body = message("evt-123");

    let first = bridge.post_webhook(&body, WEBHOOK_SECRET, NOW).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["success"], true);
    assert_eq!(first["status"], "accepted");
    assert_eq!(first["event_id"], "evt:message_created:1:evt-123");

    bridge.clock.advance(120);
    let second = bridge.post_webhook(&body, WEBHOOK_SECRET, NOW + 120).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second: Value = second.json().await.unwrap();
    assert_eq!(second["status"], "duplicate");

    let events = bridge.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id.as_deref(), Some("evt:message_created:1:evt-123"));
}

#[tokio::test]
async fn test_event_accepted_again_after_ttl() {
    let mut bridge = start_bridge(test_config()).await;
    let body = message("evt-500");

    let first = bridge.post_webhook(&body, WEBHOOK_SECRET, NOW).await;
    assert_eq!(first.status(), StatusCode::OK);

    bridge.clock.advance(601);
    let again = bridge.post_webhook(&body, WEBHOOK_SECRET, NOW + 601).await;
    let again: Value = again.json().await.unwrap();
    assert_eq!(again["status"], "accepted");
    assert_eq!(bridge.drain_events().len(), 2);
}

#[tokio::test]
async fn test_wrong_secret_is_rejected_without_recording() {
    let mut bridge = start_bridge(test_config()).await;

    let response = bridge.post_webhook(&message("evt-1"), "not-the-secret", NOW).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "SIGNATURE_MISMATCH");

    let replay = bridge.admin_get("/admin/replay").await;
    assert_eq!(replay["records"], 0);
    assert!(bridge.drain_events().is_empty());
}

#[tokio::test]
async fn test_stale_timestamp_is_rejected() {
    let bridge = start_bridge(test_config()).await;

    let response = bridge.post_webhook(&message("evt-2"), WEBHOOK_SECRET, NOW - 301).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "SIGNATURE_STALE_TIMESTAMP");
}

#[tokio::test]
async fn test_missing_signature_header() {
    let bridge = start_bridge(test_config()).await;

    let response = bridge
        .client
        .post(bridge.url("/api/webhooks/chatwoot"))
        .header("x-timestamp", NOW.to_string())
        .body(message("evt-3"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "SIGNATURE_MISSING_HEADER");
    assert_eq!(body["details"]["header"], "x-signature");
}

#[tokio::test]
async fn test_invalid_payload_is_422() {
    let bridge = start_bridge(test_config()).await;
    let body = serde_json::to_vec(&json!({ "id": 9, "event": "invoice_paid" })).unwrap();

    let response = bridge.post_webhook(&body, WEBHOOK_SECRET, NOW).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
    assert!(body["details"]["event"].is_array());
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let mut config = test_config();
    config.security.max_body_size = 128;
    let bridge = start_bridge(config).await;

    let body = serde_json::to_vec(&json!({
        "event": "message_created",
        "id": "big",
        "content": "x".repeat(1024)
    }))
    .unwrap();
    let response = bridge.post_webhook(&body, WEBHOOK_SECRET, NOW).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_payload_without_id_uses_body_digest() {
    let mut bridge = start_bridge(test_config()).await;
    let body = serde_json::to_vec(&json!({ "event": "conversation_created", "account_id": 4 })).unwrap();

    let first: Value = bridge.post_webhook(&body, WEBHOOK_SECRET, NOW).await.json().await.unwrap();
    assert!(first["event_id"].as_str().unwrap().starts_with("sha256:"));

    let second: Value = bridge.post_webhook(&body, WEBHOOK_SECRET, NOW).await.json().await.unwrap();
    assert_eq!(second["status"], "duplicate");
    assert_eq!(bridge.drain_events().len(), 1);
}
