//! Shared test helpers for `novem-core` integration tests.
//!
//! A scripted transport, an in-memory session store and a harness that wires
//! the core components together against a mock clock.

#![allow(dead_code)]

pub mod store;
pub mod transport;

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use novem_common::{Clock, MockClock};
use novem_core::{
    ConnectivityMachine, LogoutNotifier, OperationQueue, RequestPipeline, TokenLifecycleManager,
};
use novem_domain::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

pub use store::MemoryStore;
pub use transport::MockTransport;

pub const START_UNIX: i64 = 1_700_000_000;

/// Build an unsigned JWT whose `exp` claim is `exp`.
pub fn jwt(exp: i64) -> String {
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"token_type":"access"}}"#));
    format!("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.{payload}.c2ln")
}

/// A second token with the same expiry but different bytes.
pub fn jwt_variant(exp: i64, tag: &str) -> String {
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"jti":"{tag}"}}"#));
    format!("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.{payload}.c2ln")
}

pub struct Harness {
    pub clock: Arc<MockClock>,
    pub transport: Arc<MockTransport>,
    pub store: Arc<MemoryStore>,
    pub connectivity: Arc<ConnectivityMachine>,
    pub notifier: Arc<LogoutNotifier>,
    pub tokens: Arc<TokenLifecycleManager>,
    pub queue: Arc<OperationQueue>,
    pub pipeline: Arc<RequestPipeline>,
}

impl Harness {
    pub fn new(transport: MockTransport) -> Self {
        Self::with_grace_days(transport, 7)
    }

    pub fn with_grace_days(transport: MockTransport, days: i64) -> Self {
        let clock = Arc::new(MockClock::starting_at_unix(START_UNIX));
        let transport = Arc::new(transport);
        let store = Arc::new(MemoryStore::default());
        let connectivity =
            Arc::new(ConnectivityMachine::new(clock.clone(), chrono::Duration::days(days)));
        let notifier = Arc::new(LogoutNotifier::new());
        let tokens = Arc::new(TokenLifecycleManager::new(
            transport.clone(),
            store.clone(),
            connectivity.clone(),
            notifier.clone(),
            clock.clone(),
            chrono::Duration::minutes(5),
        ));
        let queue = Arc::new(OperationQueue::new(store.clone()));
        let pipeline = Arc::new(RequestPipeline::new(
            transport.clone(),
            tokens.clone(),
            connectivity.clone(),
            queue.clone(),
            clock.clone(),
        ));
        Self { clock, transport, store, connectivity, notifier, tokens, queue, pipeline }
    }

    pub fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }

    /// Seed the store with a session and restore it.
    pub async fn signed_in(self, access: &str, refresh: &str) -> Self {
        self.store.insert(ACCESS_TOKEN_KEY, access);
        self.store.insert(REFRESH_TOKEN_KEY, refresh);
        assert!(self.tokens.restore().await.unwrap());
        self
    }

    /// Seed a session whose access token is valid for another hour.
    pub async fn with_valid_session(self) -> Self {
        let access = jwt(START_UNIX + 3600);
        self.signed_in(&access, "refresh-1").await
    }
}
