//! Connectivity / grace-period state machine
//!
//! ```text
//!   ONLINE --no response--> GRACE_PERIOD --window elapsed--> EXPIRED
//!     ^                          |                              |
//!     +-------any response-------+------------------------------+
//! ```
//!
//! Expiry is evaluated lazily against the injected clock whenever the state
//! is read, so no timer is needed. A zero-length window still passes through
//! `GRACE_PERIOD` before reaching `EXPIRED`.

use chrono::{DateTime, Duration, Utc};
use novem_common::SharedClock;
use novem_domain::{is_gateway_status, ConnectivityState, ConnectivityTransition};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Inner {
    state: ConnectivityState,
    /// Set on the ONLINE -> GRACE_PERIOD edge, cleared on reconnection
    first_failure_at: Option<DateTime<Utc>>,
    last_transition: Option<ConnectivityTransition>,
}

/// Tracks whether the backend is reachable and for how long it has not been.
pub struct ConnectivityMachine {
    clock: SharedClock,
    grace_period: Duration,
    inner: Mutex<Inner>,
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMachine {
    pub fn new(clock: SharedClock, grace_period: Duration) -> Self {
        let (tx, _rx) = watch::channel(ConnectivityState::Online);
        Self { clock, grace_period, inner: Mutex::new(Inner::default()), tx }
    }

    /// Current state, after applying any pending expiry.
    pub fn state(&self) -> ConnectivityState {
        let mut inner = self.inner.lock();
        self.evaluate_expiry(&mut inner);
        inner.state
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// A request got no response (or a gateway error). Returns the state
    /// after the failure has been applied.
    pub fn record_failure(&self) -> ConnectivityState {
        let mut inner = self.inner.lock();
        if inner.state == ConnectivityState::Online {
            let now = self.clock.now();
            inner.first_failure_at = Some(now);
            self.transition(&mut inner, ConnectivityState::GracePeriod, now);
            warn!(
                grace_expires_at = %(now + self.grace_period),
                "Backend unreachable, entering grace period"
            );
        }
        self.evaluate_expiry(&mut inner);
        inner.state
    }

    /// A request got an HTTP response; the backend is reachable.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != ConnectivityState::Online {
            let now = self.clock.now();
            inner.first_failure_at = None;
            self.transition(&mut inner, ConnectivityState::Online, now);
            info!("Backend reachable again");
        }
    }

    /// Apply the outcome of an HTTP response. 502/503 mean a proxy could not
    /// reach the backend and count as failures.
    pub fn record_response(&self, status: u16) -> ConnectivityState {
        if is_gateway_status(status) {
            self.record_failure()
        } else {
            self.record_success();
            ConnectivityState::Online
        }
    }

    /// Deadline of the grace window while in `GRACE_PERIOD`.
    pub fn grace_expires_at(&self) -> Option<DateTime<Utc>> {
        let mut inner = self.inner.lock();
        self.evaluate_expiry(&mut inner);
        match inner.state {
            ConnectivityState::GracePeriod => inner.first_failure_at.map(|t| t + self.grace_period),
            _ => None,
        }
    }

    pub fn first_failure_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().first_failure_at
    }

    pub fn last_transition(&self) -> Option<ConnectivityTransition> {
        self.inner.lock().last_transition
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Receiver that observes every published state.
    ///
    /// Lazy expiry is only published once something reads the state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }

    fn evaluate_expiry(&self, inner: &mut Inner) {
        if inner.state != ConnectivityState::GracePeriod {
            return;
        }
        if let Some(first) = inner.first_failure_at {
            let deadline = first + self.grace_period;
            let now = self.clock.now();
            if now >= deadline {
                self.transition(inner, ConnectivityState::Expired, now);
                warn!(first_failure_at = %first, "Offline grace period expired");
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: ConnectivityState, at: DateTime<Utc>) {
        let from = inner.state;
        inner.state = to;
        inner.last_transition = Some(ConnectivityTransition { from, to, at });
        self.tx.send_replace(to);
    }
}

impl std::fmt::Debug for ConnectivityMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ConnectivityMachine")
            .field("state", &inner.state)
            .field("first_failure_at", &inner.first_failure_at)
            .field("grace_period", &self.grace_period)
            .finish()
    }
}
