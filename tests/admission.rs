//! Admission-gate behaviour: validation boundaries, rate limiting, auth.

use std::time::Duration;

use serde_json::json;

use burrow::{BrokerConfig, EngineTuning};

mod common;
use common::*;

/// Deadlines short enough that "admitted but no handler" resolves quickly.
fn short_deadlines() -> EngineTuning {
    EngineTuning {
        forward_deadline: Duration::from_secs(2),
        queue_wait: Duration::from_millis(500),
    }
}

#[tokio::test]
async fn test_security_headers_on_every_reply() {
    let broker = start_broker_with_tuning(BrokerConfig::default(), short_deadlines()).await;
    let client = http_client();

    for path in ["/status", "/definitely-not-bound--but-valid"] {
        let response = client.get(broker.url(path)).send().await.unwrap();
        let headers = response.headers();
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("x-xss-protection").unwrap(), "1; mode=block");
        assert_eq!(
            headers.get("referrer-policy").unwrap(),
            "strict-origin-when-cross-origin"
        );
        assert_eq!(
            headers.get("permissions-policy").unwrap(),
            "geolocation=(), microphone=(), camera=()"
        );
        // CORS defaults to `*`.
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    }

    broker.stop();
}

#[tokio::test]
async fn test_slug_length_boundaries() {
    let broker = start_broker_with_tuning(BrokerConfig::default(), short_deadlines()).await;
    let client = http_client();

    // Length 50 is a valid slug; with no handler it times out, not 400.
    let response = client
        .get(broker.url(&format!("/{}", "a".repeat(50))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 504);

    // Length 51 fails validation outright.
    let response = client
        .get(broker.url(&format!("/{}", "a".repeat(51))))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid slug");

    // The bare root has no slug at all.
    let response = client.get(broker.url("/")).send().await.unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Missing slug");

    broker.stop();
}

#[tokio::test]
async fn test_whitelist_enforcement() {
    let mut config = BrokerConfig::default();
    config.security.slug_whitelist = vec!["allowed".into()];
    let broker = start_broker_with_tuning(config, short_deadlines()).await;
    let client = http_client();

    let response = client.get(broker.url("/forbidden")).send().await.unwrap();
    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Slug not allowed");

    // Whitelisted slugs pass admission (and then queue-time-out).
    let response = client.get(broker.url("/allowed")).send().await.unwrap();
    assert_eq!(response.status(), 504);

    broker.stop();
}

#[tokio::test]
async fn test_body_size_boundaries() {
    let mut config = BrokerConfig::default();
    config.security.max_request_size = 1024;
    let broker = start_broker_with_tuning(config, short_deadlines()).await;
    let client = http_client();

    // Exactly the cap is admitted.
    let response = client
        .post(broker.url("/svc-x"))
        .body(vec![b'x'; 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 504);

    // One byte past the cap is rejected during accumulation.
    let response = client
        .post(broker.url("/svc-x"))
        .body(vec![b'x'; 1025])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Request body too large");

    broker.stop();
}

#[tokio::test]
async fn test_rate_limit_window() {
    let mut config = BrokerConfig::default();
    config.rate_limit.max_requests_per_minute = 3;
    let broker = start_broker(config).await;
    let client = http_client();

    for _ in 0..3 {
        let response = client.get(broker.url("/status")).send().await.unwrap();
        assert_eq!(response.status(), 200);
    }

    let response = client.get(broker.url("/status")).send().await.unwrap();
    assert_eq!(response.status(), 429);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Rate limit exceeded");

    broker.stop();
}

#[tokio::test]
async fn test_control_channel_open_limit() {
    let mut config = BrokerConfig::default();
    config.rate_limit.max_connections_per_ip = 2;
    let broker = start_broker(config).await;

    let _first = connect_handler(broker.addr).await;
    let _second = connect_handler(broker.addr).await;

    // The third upgrade in the window is refused outright.
    let result = tokio_tungstenite::connect_async(format!("ws://{}/ws", broker.addr)).await;
    assert!(result.is_err());

    broker.stop();
}

#[tokio::test]
async fn test_login_and_gated_status_api() {
    let mut config = BrokerConfig::default();
    config.auth.require_auth = true;
    config.auth.admin_password = "integration-pw".into();
    config.auth.token_secret = "integration-secret".into();
    let broker = start_broker(config).await;
    let client = http_client();

    // No bearer: 401.
    let response = client.get(broker.url("/api/status")).send().await.unwrap();
    assert_eq!(response.status(), 401);

    // Wrong password: 401.
    let response = client
        .post(broker.url("/auth/login"))
        .json(&json!({ "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Correct password: token plus advertised lifetime.
    let response = client
        .post(broker.url("/auth/login"))
        .json(&json!({ "password": "integration-pw" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["expiresIn"], 86_400);

    // The bearer unlocks the status API.
    let response = client
        .get(broker.url("/api/status"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["serverStartTime"].as_u64().is_some());
    assert_eq!(body["pendingRequests"], 0);
    assert!(body["activeClients"].as_array().unwrap().is_empty());
    assert!(body["stats"]["received"].as_u64().is_some());

    broker.stop();
}

#[tokio::test]
async fn test_status_api_open_by_default() {
    let broker = start_broker(BrokerConfig::default()).await;

    let mut handler = connect_handler(broker.addr).await;
    register(&mut handler, "svc-visible").await;

    let response = http_client()
        .get(broker.url("/api/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let clients = body["activeClients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["slug"], "svc-visible");

    broker.stop();
}
