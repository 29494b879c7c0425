//! Background task behavior of `NovemClient`
//!
//! **Coverage:**
//! - Probe transitions trigger a health check and replay
//! - The proactive ticker refreshes a token nearing expiry
//! - Shutdown stops both tasks

#[path = "support.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use novem_domain::{ApiError, Config, ConnectivityState};
use novem_infra::ManualProbe;
use serde_json::{json, Value};
use support::{eventually, jwt, TestClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn probe_recovery_replays_queue() {
    let probe = Arc::new(ManualProbe::new(true));
    let t = TestClient::start_with_probe(probe.clone()).await.logged_in().await;
    t.drop_requests("GET", "/api/projects/", 1).await;
    t.drop_requests("POST", "/api/projects/", 1).await;
    let _ = t.client.get::<Value>("/projects/").await;
    let queued = t.client.post::<Value, _>("/projects/", &json!({ "name": "Atlas" })).await;
    assert!(matches!(queued, Err(ApiError::OfflineQueued { .. })));
    probe.set_reachable(false);

    Mock::given(method("GET"))
        .and(path("/api/health/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&t.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/projects/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 9 })))
        .expect(1..)
        .mount(&t.server)
        .await;

    probe.set_reachable(true);

    assert!(eventually(|| t.client.pending_operations().is_empty()).await);
    assert_eq!(t.client.connectivity_state(), ConnectivityState::Online);
    assert_eq!(t.requests_to("GET", "/api/health/").await, 1);
}

#[tokio::test]
async fn ticker_refreshes_before_expiry() {
    let mut config = Config::default();
    config.auth.proactive_interval_secs = 1;
    let t = TestClient::start_with(config).await;

    // Inside the five minute threshold from the start
    let expiring = jwt(t.now() + 120, "expiring");
    let rotated = jwt(t.now() + 3600, "rotated");
    Mock::given(method("POST"))
        .and(path("/api/auth/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": expiring, "refresh": "refresh-1", "user": {}
        })))
        .mount(&t.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": rotated })))
        .expect(1)
        .mount(&t.server)
        .await;

    t.client.login("ada@example.com", "pw").await.unwrap();
    assert!(t.client.is_refresh_ticker_running());

    let mut refreshed = false;
    for _ in 0..30 {
        if t.requests_to("POST", "/api/auth/token/refresh/").await == 1 {
            refreshed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(refreshed, "ticker never refreshed");
    assert!(eventually(|| t.client.is_token_valid()).await);
}

#[tokio::test]
async fn shutdown_stops_background_tasks() {
    let t = TestClient::start().await.logged_in().await;
    assert!(t.client.is_refresh_ticker_running());

    t.client.shutdown().await;

    assert!(!t.client.is_refresh_ticker_running());
    // The session survives a shutdown
    assert!(t.client.has_session());
}
