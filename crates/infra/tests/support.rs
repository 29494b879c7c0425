//! Shared helpers for `novem-infra` integration tests.
//!
//! A [`TestClient`] is a [`NovemClient`] pointed at a WireMock server, with a
//! mock clock and an in-memory session store.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use novem_common::{Clock, MockClock, SharedClock};
use novem_core::ConnectivityProbe;
use novem_domain::Config;
use novem_infra::{MemorySessionStore, NovemClient, ReqwestTransport};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const START_UNIX: i64 = 1_700_000_000;

/// Transport timeout; mocks delayed past it count as "no response".
pub const TIMEOUT: Duration = Duration::from_millis(200);

/// Build an unsigned JWT whose `exp` claim is `exp`.
pub fn jwt(exp: i64, tag: &str) -> String {
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"jti":"{tag}"}}"#));
    format!("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.{payload}.c2ln")
}

pub struct TestClient {
    pub server: MockServer,
    pub clock: Arc<MockClock>,
    pub store: Arc<MemorySessionStore>,
    pub client: NovemClient,
}

impl TestClient {
    pub async fn start() -> Self {
        Self::start_with(Config::default()).await
    }

    pub async fn start_with(config: Config) -> Self {
        Self::build(config, None).await
    }

    pub async fn start_with_probe(probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self::build(Config::default(), Some(probe)).await
    }

    async fn build(mut config: Config, probe: Option<Arc<dyn ConnectivityProbe>>) -> Self {
        let server = MockServer::start().await;
        config.api.base_url = format!("{}/api", server.uri());

        let clock = Arc::new(MockClock::starting_at_unix(START_UNIX));
        let store = Arc::new(MemorySessionStore::new());
        let transport = ReqwestTransport::builder()
            .base_url(&config.api.base_url)
            .timeout(TIMEOUT)
            .build()
            .expect("transport");

        let shared_clock: SharedClock = clock.clone();
        let mut builder = NovemClient::builder(config)
            .transport(Arc::new(transport))
            .session_store(store.clone())
            .clock(shared_clock);
        if let Some(probe) = probe {
            builder = builder.probe(probe);
        }
        let client = builder.build().expect("client");

        Self { server, clock, store, client }
    }

    pub fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }

    /// Token valid for another hour.
    pub fn fresh_token(&self, tag: &str) -> String {
        jwt(self.now() + 3600, tag)
    }

    /// Mount a login endpoint and sign in with it.
    pub async fn logged_in(self) -> Self {
        let access = self.fresh_token("login");
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access": access,
                "refresh": "refresh-1",
                "user": { "id": 1, "email": "ada@example.com" }
            })))
            .mount(&self.server)
            .await;
        self.client.login("ada@example.com", "pw").await.expect("login");
        self
    }

    /// Next `times` requests matching `verb` + `route` get no response.
    pub async fn drop_requests(&self, verb: &str, route: &str, times: u64) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_delay(TIMEOUT * 10))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    pub async fn requests_to(&self, verb: &str, route: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == verb && r.url.path() == route)
            .count()
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
