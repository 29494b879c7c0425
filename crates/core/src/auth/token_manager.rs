//! Token lifecycle manager
//!
//! Owns the in-memory session and every transition of it: login, restore,
//! refresh and teardown.
//!
//! # Single-flight refresh
//!
//! At most one refresh request is in flight. The first caller that needs a
//! refresh becomes the leader and talks to the backend; callers arriving while
//! it runs are parked as waiters and receive the leader's outcome in the order
//! they arrived. The check-and-set on the guard happens under a synchronous
//! lock and is never split by an `.await`.
//!
//! If the leader's future is dropped before it settles, the guard returns to
//! idle and rejects the parked waiters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use novem_common::SharedClock;
use novem_domain::constants::{
    ACCESS_TOKEN_KEY, IDENTITY_KEY, LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH, REFRESH_TOKEN_KEY,
    SESSION_KEYS,
};
use novem_domain::{
    is_gateway_status, AccessToken, ApiError, HttpMethod, HttpRequest, Identity, LoginRequest,
    LoginResponse, LogoutReason, LogoutRequest, RefreshRequest, RefreshResponse, RefreshStatus,
    RefreshToken, Session,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use super::events::LogoutNotifier;
use super::jwt::parse_access_token;
use crate::connectivity::ConnectivityMachine;
use crate::pipeline::error_for_status;
use crate::ports::{SessionStore, Transport, TransportError};

type RefreshResult = Result<AccessToken, ApiError>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<RefreshResult>>,
}

enum Role<'a> {
    Leader(RefreshGuard<'a>),
    Waiter(oneshot::Receiver<RefreshResult>),
}

/// Held by the refresh leader. Settling hands the outcome to every waiter;
/// dropping without settling rejects them.
struct RefreshGuard<'a> {
    state: &'a Mutex<RefreshState>,
    settled: bool,
}

impl RefreshGuard<'_> {
    fn settle(mut self, result: &RefreshResult) {
        self.settled = true;
        let waiters = self.release();
        for waiter in waiters {
            // A waiter that went away no longer needs the result
            let _ = waiter.send(result.clone());
        }
    }

    fn release(&self) -> VecDeque<oneshot::Sender<RefreshResult>> {
        let mut state = self.state.lock();
        state.refreshing = false;
        std::mem::take(&mut state.waiters)
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = self.release();
        if !waiters.is_empty() {
            warn!(waiters = waiters.len(), "Token refresh abandoned, rejecting waiters");
        }
        for waiter in waiters {
            let _ = waiter.send(Err(ApiError::Offline));
        }
    }
}

enum RefreshFailure {
    /// No usable response; the credential chain was not rejected
    NoResponse(String),
    /// The backend refused the refresh token
    Rejected(ApiError),
    /// Nothing to refresh, or the session ended meanwhile
    Aborted(ApiError),
}

pub struct TokenLifecycleManager {
    transport: Arc<dyn Transport>,
    store: Arc<dyn SessionStore>,
    connectivity: Arc<ConnectivityMachine>,
    notifier: Arc<LogoutNotifier>,
    clock: SharedClock,
    refresh_threshold: Duration,
    session: RwLock<Option<Session>>,
    // Bumped whenever the session is replaced or torn down
    generation: AtomicU64,
    refresh: Mutex<RefreshState>,
}

impl TokenLifecycleManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn SessionStore>,
        connectivity: Arc<ConnectivityMachine>,
        notifier: Arc<LogoutNotifier>,
        clock: SharedClock,
        refresh_threshold: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            connectivity,
            notifier,
            clock,
            refresh_threshold,
            session: RwLock::new(None),
            generation: AtomicU64::new(0),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.read().is_some()
    }

    /// Whether the current access token decodes and has not expired. No I/O.
    pub fn is_token_valid(&self) -> bool {
        let now = self.clock.now();
        self.session.read().as_ref().is_some_and(|s| s.access.is_valid_at(now))
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.session.read().as_ref().map(|s| s.access.clone())
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.session.read().as_ref().and_then(|s| s.identity.clone())
    }

    pub fn refresh_status(&self) -> RefreshStatus {
        if self.refresh.lock().refreshing {
            RefreshStatus::Refreshing
        } else {
            RefreshStatus::Idle
        }
    }

    /// Callers currently parked behind an in-flight refresh
    pub fn pending_waiters(&self) -> usize {
        self.refresh.lock().waiters.len()
    }

    pub fn notifier(&self) -> &Arc<LogoutNotifier> {
        &self.notifier
    }

    /// Return a usable access token, refreshing first when it is within the
    /// refresh threshold of expiry.
    ///
    /// While the backend is unreachable the current token is returned as long
    /// as it has not actually expired.
    pub async fn get_valid_token(&self) -> Result<AccessToken, ApiError> {
        let Some(token) = self.access_token() else {
            return Err(ApiError::AuthRequired);
        };

        let now = self.clock.now();
        if !token.expires_within(self.refresh_threshold, now) {
            return Ok(token);
        }

        if !self.connectivity.is_online() {
            return if token.is_valid_at(now) { Ok(token) } else { Err(ApiError::Offline) };
        }

        debug!(
            seconds_until_expiry = ?token.seconds_until_expiry(now),
            "Access token near expiry, refreshing proactively"
        );
        match self.refresh_single_flight().await {
            Ok(fresh) => Ok(fresh),
            Err(ApiError::Offline) if token.is_valid_at(self.clock.now()) => Ok(token),
            Err(err) => Err(err),
        }
    }

    /// Called after the backend answered 401 to a request made with `stale`.
    ///
    /// Returns the current token without a network call when a concurrent
    /// refresh already replaced `stale`.
    pub async fn refresh_on_unauthorized(&self, stale: &str) -> Result<AccessToken, ApiError> {
        let Some(current) = self.access_token() else {
            return Err(ApiError::AuthRequired);
        };

        if current.as_str() != stale && current.is_valid_at(self.clock.now()) {
            debug!("Access token already rotated, reusing it");
            return Ok(current);
        }

        self.refresh_single_flight().await
    }

    async fn refresh_single_flight(&self) -> Result<AccessToken, ApiError> {
        if !self.connectivity.is_online() {
            debug!("Refresh skipped while backend is unreachable");
            return Err(ApiError::Offline);
        }

        let role = {
            let mut state = self.refresh.lock();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Role::Waiter(rx)
            } else {
                state.refreshing = true;
                Role::Leader(RefreshGuard { state: &self.refresh, settled: false })
            }
        };

        match role {
            // A dropped sender means the leader was abandoned
            Role::Waiter(rx) => rx.await.unwrap_or(Err(ApiError::Offline)),
            Role::Leader(guard) => self.lead_refresh(guard).await,
        }
    }

    async fn lead_refresh(&self, guard: RefreshGuard<'_>) -> Result<AccessToken, ApiError> {
        match self.request_refresh().await {
            Ok(token) => {
                let result = Ok(token);
                guard.settle(&result);
                info!("Access token refreshed");
                result
            }
            Err(RefreshFailure::NoResponse(message)) => {
                warn!(error = %message, "Token refresh got no response, keeping session");
                let result = Err(ApiError::Offline);
                guard.settle(&result);
                result
            }
            Err(RefreshFailure::Rejected(err)) => {
                warn!(error = %err, "Token refresh rejected, ending session");
                // Cleared before waiters wake so nobody retries with the dead token
                let previous = self.take_session();
                let result = Err(err);
                guard.settle(&result);
                self.finish_teardown(previous, LogoutReason::RefreshFailed).await;
                result
            }
            Err(RefreshFailure::Aborted(err)) => {
                let result = Err(err);
                guard.settle(&result);
                result
            }
        }
    }

    async fn request_refresh(&self) -> Result<AccessToken, RefreshFailure> {
        let (refresh, generation) = {
            let session = self.session.read();
            match session.as_ref() {
                Some(s) => (s.refresh.clone(), self.generation.load(Ordering::Acquire)),
                None => return Err(RefreshFailure::Aborted(ApiError::AuthRequired)),
            }
        };

        let body = serde_json::to_value(RefreshRequest { refresh: refresh.clone() })
            .map_err(|e| RefreshFailure::Aborted(ApiError::Config { message: e.to_string() }))?;
        let request = HttpRequest::new(HttpMethod::Post, REFRESH_PATH).with_body(Some(body));

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(TransportError::NoResponse(message)) => {
                self.connectivity.record_failure();
                return Err(RefreshFailure::NoResponse(message));
            }
            Err(TransportError::InvalidRequest(message)) => {
                return Err(RefreshFailure::Aborted(ApiError::Config { message }));
            }
        };

        self.connectivity.record_response(response.status);
        if is_gateway_status(response.status) {
            return Err(RefreshFailure::NoResponse(format!("gateway status {}", response.status)));
        }
        if !response.is_success() {
            return Err(RefreshFailure::Rejected(ApiError::RefreshFailed {
                message: format!("backend rejected refresh with status {}", response.status),
            }));
        }

        let payload: RefreshResponse = serde_json::from_value(response.body).map_err(|e| {
            RefreshFailure::Rejected(ApiError::RefreshFailed {
                message: format!("invalid refresh response: {e}"),
            })
        })?;

        let access = parse_access_token(&payload.access);
        let refresh = payload.refresh.map(RefreshToken::new).unwrap_or(refresh);

        if self.generation.load(Ordering::Acquire) != generation {
            debug!("Session replaced during refresh, discarding new tokens");
            return Err(RefreshFailure::Aborted(ApiError::AuthRequired));
        }

        let entries = [
            (ACCESS_TOKEN_KEY, access.as_str().to_string()),
            (REFRESH_TOKEN_KEY, refresh.as_str().to_string()),
        ];
        if let Err(err) = self.store.set_many(&entries).await {
            warn!(error = %err, "Failed to persist refreshed tokens");
        }

        let mut session = self.session.write();
        match session.as_mut() {
            Some(current) if self.generation.load(Ordering::Acquire) == generation => {
                current.access = access.clone();
                current.refresh = refresh;
                Ok(access)
            }
            _ => {
                debug!("Session ended during refresh, discarding new tokens");
                Err(RefreshFailure::Aborted(ApiError::AuthRequired))
            }
        }
    }

    /// Exchange credentials for a session. Persists all three slots, then
    /// commits in memory.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        let body = serde_json::to_value(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
        .map_err(|e| ApiError::Config { message: e.to_string() })?;
        let request = HttpRequest::new(HttpMethod::Post, LOGIN_PATH).with_body(Some(body));

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(TransportError::NoResponse(message)) => {
                self.connectivity.record_failure();
                return Err(ApiError::Unreachable { message });
            }
            Err(TransportError::InvalidRequest(message)) => {
                return Err(ApiError::Config { message });
            }
        };

        self.connectivity.record_response(response.status);
        if !response.is_success() {
            return Err(match response.status {
                // Wrong credentials, not an expired session
                400 | 401 => ApiError::Validation { status: response.status, payload: response.body },
                status => error_for_status(status, response.body),
            });
        }

        let payload: LoginResponse = serde_json::from_value(response.body)
            .map_err(|e| ApiError::Decode { message: e.to_string() })?;
        let identity = Identity(payload.user);
        let session = Session {
            access: parse_access_token(&payload.access),
            refresh: RefreshToken::new(payload.refresh),
            identity: Some(identity.clone()),
        };
        let identity_json = serde_json::to_string(&identity)
            .map_err(|e| ApiError::Decode { message: e.to_string() })?;

        let entries = [
            (ACCESS_TOKEN_KEY, session.access.as_str().to_string()),
            (REFRESH_TOKEN_KEY, session.refresh.as_str().to_string()),
            (IDENTITY_KEY, identity_json),
        ];
        if let Err(err) = self.store.set_many(&entries).await {
            warn!(error = %err, "Failed to persist session");
        }

        self.commit_session(session);
        info!("Logged in");
        Ok(identity)
    }

    /// Load a previously persisted session. Returns whether one was found.
    ///
    /// An access token that does not decode is kept and refreshed on first use.
    pub async fn restore(&self) -> Result<bool, ApiError> {
        let Some(refresh) = self.store.get(REFRESH_TOKEN_KEY).await? else {
            debug!("No stored session");
            return Ok(false);
        };

        let access = match self.store.get(ACCESS_TOKEN_KEY).await? {
            Some(raw) => parse_access_token(&raw),
            None => AccessToken::from_parts(String::new(), None),
        };
        let identity = match self.store.get(IDENTITY_KEY).await? {
            Some(raw) => match serde_json::from_str::<Identity>(&raw) {
                Ok(identity) => Some(identity),
                Err(err) => {
                    warn!(error = %err, "Stored identity is not valid JSON, ignoring it");
                    None
                }
            },
            None => None,
        };

        let token_valid = access.is_valid_at(self.clock.now());
        self.commit_session(Session { access, refresh: RefreshToken::new(refresh), identity });
        info!(token_valid, "Restored session");
        Ok(true)
    }

    /// Revoke the refresh token (best effort, only when reachable), then
    /// tear the session down locally.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> bool {
        let snapshot = self.session.read().clone();
        if let Some(session) = snapshot {
            if self.connectivity.is_online() {
                self.revoke(&session).await;
            } else {
                debug!("Backend unreachable, skipping remote logout");
            }
        }
        self.end_session(LogoutReason::UserInitiated).await
    }

    async fn revoke(&self, session: &Session) {
        let body = match serde_json::to_value(LogoutRequest { refresh: session.refresh.clone() }) {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "Failed to encode logout request");
                return;
            }
        };

        let mut request = HttpRequest::new(HttpMethod::Post, LOGOUT_PATH).with_body(Some(body));
        if session.access.is_valid_at(self.clock.now()) {
            request = request.with_bearer(session.access.as_str());
        }

        match self.transport.send(request).await {
            Ok(response) => {
                self.connectivity.record_response(response.status);
                if response.is_success() {
                    debug!("Refresh token revoked");
                } else {
                    warn!(status = response.status, "Backend refused logout, continuing locally");
                }
            }
            Err(err) => warn!(error = %err, "Logout request failed, continuing locally"),
        }
    }

    /// Local teardown shared by logout, refresh failure and account deletion.
    ///
    /// Clears memory and the store, then notifies subscribers. Returns
    /// `false` (and notifies nobody) when there was no session.
    pub async fn end_session(&self, reason: LogoutReason) -> bool {
        let previous = self.take_session();
        self.finish_teardown(previous, reason).await
    }

    fn take_session(&self) -> Option<Session> {
        let mut session = self.session.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        session.take()
    }

    async fn finish_teardown(&self, previous: Option<Session>, reason: LogoutReason) -> bool {
        if previous.is_none() {
            debug!(%reason, "No session to end");
            return false;
        }

        if let Err(err) = self.store.remove_many(&SESSION_KEYS).await {
            warn!(error = %err, "Failed to clear stored session");
        }
        info!(%reason, "Session ended");
        self.notifier.notify(reason);
        true
    }

    fn commit_session(&self, session: Session) {
        let mut current = self.session.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *current = Some(session);
    }
}

impl std::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("has_session", &self.has_session())
            .field("refresh_status", &self.refresh_status())
            .field("refresh_threshold", &self.refresh_threshold)
            .finish()
    }
}
