//! Authentication, authorization, rate limiting and HTTP surface.

use reqwest::StatusCode;
use serde_json::Value;

mod common;

use common::{start_bridge, test_config, EXPIRED_TOKEN, OFFICER_TOKEN, READER_TOKEN};

#[tokio::test]
async fn test_sixth_login_in_a_minute_is_throttled() {
    let bridge = start_bridge(test_config()).await;

    for attempt in 1..=5 {
        let response = bridge.client.post(bridge.url("/api/auth/login")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "attempt {attempt}");
    }

    let response = bridge.client.post(bridge.url("/api/auth/login")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "RATE_LIMIT_EXCEEDED");

    // Other classes keep their own budget.
    let refresh = bridge.client.post(bridge.url("/api/auth/refresh")).send().await.unwrap();
    assert_eq!(refresh.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_budget_returns_after_window() {
    let bridge = start_bridge(test_config()).await;
    for _ in 0..5 {
        bridge.client.post(bridge.url("/api/auth/login")).send().await.unwrap();
    }

    bridge.clock.advance(61);
    let response = bridge.client.post(bridge.url("/api/auth/login")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_ability_is_forbidden() {
    let bridge = start_bridge(test_config()).await;

    let response = bridge
        .client
        .post(bridge.url("/api/lgpd/consents"))
        .bearer_auth(READER_TOKEN)
        .json(&serde_json::json!({ "purpose": "marketing", "granted": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "FORBIDDEN");
    assert_eq!(body["details"]["required_ability"], "lgpd:write");

    let response = bridge
        .client
        .post(bridge.url("/api/lgpd/consents"))
        .bearer_auth(OFFICER_TOKEN)
        .json(&serde_json::json!({ "purpose": "marketing", "granted": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_authentication_failures() {
    let bridge = start_bridge(test_config()).await;

    let cases = [
        (None, "UNAUTHENTICATED"),
        (Some("9|unknown"), "UNAUTHENTICATED"),
        (Some("no-separator"), "TOKEN_MALFORMED"),
        (Some(EXPIRED_TOKEN), "TOKEN_EXPIRED"),
    ];

    for (token, code) in cases {
        let mut request = bridge.client.get(bridge.url("/api/conversations"));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{code}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error_code"], code);
    }
}

#[tokio::test]
async fn test_request_id_echoed_or_generated() {
    let bridge = start_bridge(test_config()).await;

    let response = bridge
        .client
        .get(bridge.url("/does-not-exist"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "abc-123");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], "ROUTE_NOT_FOUND");
    assert_eq!(body["request_id"], "abc-123");

    let response = bridge.client.get(bridge.url("/does-not-exist")).send().await.unwrap();
    let header = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(header.starts_with("req_"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["request_id"], header);
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let bridge = start_bridge(test_config()).await;

    let response = bridge.client.get(bridge.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_admin_requires_key() {
    let bridge = start_bridge(test_config()).await;

    let response = bridge.client.get(bridge.url("/admin/status")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = bridge
        .client
        .get(bridge.url("/admin/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    bridge.client.post(bridge.url("/api/auth/login")).send().await.unwrap();
    let status = bridge.admin_get("/admin/status").await;
    assert_eq!(status["status"], "operational");
    assert_eq!(status["rate_limit_buckets"], 1);

    let limits = bridge.admin_get("/admin/limits").await;
    let login = limits["classes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["class"] == "login")
        .unwrap()
        .clone();
    assert_eq!(login["per_minute"], 5);
    assert_eq!(login["per_hour"], 20);
}
