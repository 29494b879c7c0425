//! Client facade
//!
//! [`NovemClient`] wires every component once at process start and is then
//! shared by reference (`Arc<NovemClient>`) with the rest of the application.
//!
//! ```no_run
//! use novem_infra::{config, NovemClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NovemClient::builder(config::load()?).build()?;
//! if !client.restore().await? {
//!     client.login("ada@example.com", "correct horse").await?;
//! }
//! let projects: serde_json::Value = client.get("/projects/").await?;
//! # let _ = projects;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use novem_common::{SharedClock, SystemClock};
use novem_core::{
    ConnectivityMachine, ConnectivityProbe, LogoutNotifier, OperationQueue, ReplayReport,
    RequestPipeline, SessionStore, SubscriptionId, TokenLifecycleManager, Transport,
};
use novem_domain::constants::DELETE_ACCOUNT_PATH;
use novem_domain::{
    ApiError, Config, ConnectivityState, HttpMethod, Identity, LogoutReason, NovemError,
    QueuedOperation, RefreshStatus,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::connectivity::{HealthCheckProbe, ManualProbe};
use crate::http::ReqwestTransport;
use crate::scheduling::{ProactiveRefreshTask, SchedulerError};
use crate::storage::build_session_store;
use crate::sync::{ReconnectWorker, ReconnectWorkerConfig};

/// Resilient backend client: token lifecycle, grace period and offline queue.
pub struct NovemClient {
    config: Config,
    store: Arc<dyn SessionStore>,
    connectivity: Arc<ConnectivityMachine>,
    notifier: Arc<LogoutNotifier>,
    tokens: Arc<TokenLifecycleManager>,
    queue: Arc<OperationQueue>,
    pipeline: Arc<RequestPipeline>,
    ticker: Arc<ProactiveRefreshTask>,
    reconnect_worker: ReconnectWorker,
    teardown_subscription: SubscriptionId,
}

impl NovemClient {
    pub fn builder(config: Config) -> NovemClientBuilder {
        NovemClientBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // --- requests -----------------------------------------------------------

    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        self.pipeline.execute(method, path, body).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.pipeline.get(path).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        self.pipeline.post(path, body).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        self.pipeline.put(path, body).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        self.pipeline.patch(path, body).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.pipeline.delete(path).await
    }

    // --- session ------------------------------------------------------------

    pub fn is_token_valid(&self) -> bool {
        self.tokens.is_token_valid()
    }

    pub fn has_session(&self) -> bool {
        self.tokens.has_session()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.tokens.current_identity()
    }

    pub fn refresh_status(&self) -> RefreshStatus {
        self.tokens.refresh_status()
    }

    /// Sign in and start the proactive refresh ticker.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, ApiError> {
        let identity = self.tokens.login(email, password).await?;
        self.start_ticker();
        Ok(identity)
    }

    /// Load a persisted session and offline queue at startup.
    ///
    /// Returns whether a session was found. A corrupt queue is logged and
    /// left empty.
    pub async fn restore(&self) -> Result<bool, ApiError> {
        let restored = self.tokens.restore().await?;
        match self.queue.load().await {
            Ok(0) => {}
            Ok(count) => info!(count, "Offline queue restored"),
            Err(err) => warn!(error = %err, "Offline queue could not be restored"),
        }
        if restored {
            self.start_ticker();
        }
        Ok(restored)
    }

    /// Sign out. Drops operations still waiting in the offline queue.
    ///
    /// Returns `false` when there was no session.
    pub async fn logout(&self) -> bool {
        let ended = self.tokens.logout().await;
        self.queue.clear().await;
        ended
    }

    /// Delete the account on the backend, then end the local session.
    ///
    /// Never queued: fails with the pipeline error when the backend cannot be
    /// reached.
    #[instrument(skip(self))]
    pub async fn delete_account(&self) -> Result<(), ApiError> {
        self.pipeline.execute_direct(HttpMethod::Post, DELETE_ACCOUNT_PATH, None).await?;
        self.tokens.end_session(LogoutReason::AccountDeleted).await;
        self.queue.clear().await;
        Ok(())
    }

    pub fn subscribe_logout<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(LogoutReason) + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe_logout(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    // --- connectivity and queue ---------------------------------------------

    pub fn connectivity_state(&self) -> ConnectivityState {
        self.connectivity.state()
    }

    pub fn watch_connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.connectivity.subscribe()
    }

    /// End of the grace window, while in `GRACE_PERIOD` or `EXPIRED`
    pub fn grace_expires_at(&self) -> Option<DateTime<Utc>> {
        self.connectivity.grace_expires_at()
    }

    pub fn pending_operations(&self) -> Vec<QueuedOperation> {
        self.queue.snapshot()
    }

    pub async fn discard_operation(&self, id: Uuid) -> bool {
        self.queue.discard(id).await
    }

    /// Health check and replay. Call when the platform reports the network
    /// is back; the background worker calls it on its own as well.
    pub async fn reconnect(&self) -> Result<ReplayReport, ApiError> {
        self.pipeline.reconnect().await
    }

    pub fn is_refresh_ticker_running(&self) -> bool {
        self.ticker.is_running()
    }

    /// Stop background tasks. The session is kept.
    pub async fn shutdown(&self) {
        self.reconnect_worker.stop();
        match self.ticker.shutdown().await {
            Ok(()) | Err(SchedulerError::NotRunning) => {}
            Err(err) => warn!(error = %err, "Proactive refresh did not stop cleanly"),
        }
        debug!("Client shut down");
    }

    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    fn start_ticker(&self) {
        match self.ticker.start() {
            Ok(()) | Err(SchedulerError::AlreadyRunning) => {}
            Err(err) => warn!(error = %err, "Proactive refresh could not start"),
        }
    }
}

impl Drop for NovemClient {
    fn drop(&mut self) {
        self.notifier.unsubscribe(self.teardown_subscription);
        self.ticker.stop();
        self.reconnect_worker.stop();
    }
}

impl std::fmt::Debug for NovemClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NovemClient")
            .field("base_url", &self.config.api.base_url)
            .field("connectivity", &self.connectivity.state())
            .field("pending_operations", &self.queue.len())
            .field("ticker", &self.ticker)
            .finish()
    }
}

/// Builder for [`NovemClient`]. Every collaborator defaults to the adapter
/// selected by configuration.
pub struct NovemClientBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn SessionStore>>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    clock: Option<SharedClock>,
    health_check_probe: bool,
}

impl NovemClientBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            store: None,
            probe: None,
            clock: None,
            health_check_probe: false,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a [`HealthCheckProbe`] polling at the configured interval instead
    /// of an always-reachable [`ManualProbe`]. Ignored when a probe is set.
    pub fn health_check_probe(mut self, enabled: bool) -> Self {
        self.health_check_probe = enabled;
        self
    }

    /// Wire the components and start the reconnection worker.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// Returns `NovemError::Config` if the default transport cannot be built
    /// from the configured base URL.
    pub fn build(self) -> Result<NovemClient, NovemError> {
        let Self { config, transport, store, probe, clock, health_check_probe } = self;

        let transport = match transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::from_config(&config.api)?),
        };
        let store = store.unwrap_or_else(|| build_session_store(&config.storage));
        let clock = clock.unwrap_or_else(SystemClock::shared);
        let probe: Arc<dyn ConnectivityProbe> = match probe {
            Some(probe) => probe,
            None if health_check_probe => Arc::new(HealthCheckProbe::spawn(
                Arc::clone(&transport),
                config.offline.health_poll_interval(),
            )),
            None => Arc::new(ManualProbe::default()),
        };

        let connectivity =
            Arc::new(ConnectivityMachine::new(Arc::clone(&clock), config.offline.grace_period()));
        let notifier = Arc::new(LogoutNotifier::new());
        let tokens = Arc::new(TokenLifecycleManager::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::clone(&connectivity),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            config.auth.refresh_threshold(),
        ));
        let queue = Arc::new(OperationQueue::new(Arc::clone(&store)));
        let pipeline = Arc::new(RequestPipeline::new(
            transport,
            Arc::clone(&tokens),
            Arc::clone(&connectivity),
            Arc::clone(&queue),
            clock,
        ));

        let ticker = Arc::new(ProactiveRefreshTask::new(
            Arc::clone(&tokens),
            config.auth.proactive_interval(),
        ));
        let teardown_subscription =
            notifier.subscribe(stop_ticker_on_logout(Arc::downgrade(&ticker)));

        let reconnect_worker = ReconnectWorker::new(
            Arc::clone(&pipeline),
            Arc::clone(&connectivity),
            probe,
            ReconnectWorkerConfig { health_poll: config.offline.health_poll_interval() },
        );
        reconnect_worker.start().map_err(NovemError::from)?;

        info!(base_url = %config.api.base_url, "Novem client ready");

        Ok(NovemClient {
            config,
            store,
            connectivity,
            notifier,
            tokens,
            queue,
            pipeline,
            ticker,
            reconnect_worker,
            teardown_subscription,
        })
    }
}

/// Every session teardown stops the ticker, including refresh failures that
/// happen inside a request.
fn stop_ticker_on_logout(
    ticker: Weak<ProactiveRefreshTask>,
) -> impl Fn(LogoutReason) + Send + Sync + 'static {
    move |reason| {
        if let Some(ticker) = ticker.upgrade() {
            if ticker.stop() {
                debug!(%reason, "Proactive refresh stopped on logout");
            }
        }
    }
}
