//! Proactive token refresh ticker
//!
//! Calls [`TokenLifecycleManager::get_valid_token`] on a fixed interval so the
//! access token is renewed before it expires instead of on the next 401.
//! Failures are only logged: the next request surfaces them.
//!
//! The task is started on login/restore and stopped on every session
//! teardown. [`ProactiveRefreshTask::stop`] is synchronous and idempotent so
//! it can run from a logout listener; it reports whether it actually stopped
//! a running task.

use std::sync::Arc;
use std::time::Duration;

use novem_core::TokenLifecycleManager;
use novem_domain::ApiError;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ProactiveRefreshTask {
    tokens: Arc<TokenLifecycleManager>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl ProactiveRefreshTask {
    pub fn new(tokens: Arc<TokenLifecycleManager>, interval: Duration) -> Self {
        Self { tokens, interval, running: Mutex::new(None) }
    }

    /// Spawn the ticker. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyRunning`] if a ticker is active.
    #[instrument(skip(self))]
    pub fn start(&self) -> SchedulerResult<()> {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(Arc::clone(&self.tokens), self.interval, cancel.clone()));
        *running = Some(Running { cancel, handle });

        info!(interval_secs = self.interval.as_secs(), "Proactive refresh started");
        Ok(())
    }

    /// Cancel the ticker. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };
        running.cancel.cancel();
        let was_running = !running.handle.is_finished();
        if was_running {
            info!("Proactive refresh stopped");
        }
        was_running
    }

    /// Cancel the ticker and wait for the task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotRunning`] if no ticker was active, or a
    /// timeout/join error if the task does not wind down.
    pub async fn shutdown(&self) -> SchedulerResult<()> {
        let running = self.running.lock().take().ok_or(SchedulerError::NotRunning)?;
        running.cancel.cancel();

        let join_timeout = Duration::from_secs(5);
        tokio::time::timeout(join_timeout, running.handle)
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
            .map_err(|err| SchedulerError::TaskJoinFailed(err.to_string()))
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(|r| !r.handle.is_finished())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for ProactiveRefreshTask {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for ProactiveRefreshTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProactiveRefreshTask")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn tick_loop(tokens: Arc<TokenLifecycleManager>, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Proactive refresh loop cancelled");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                if !tokens.has_session() {
                    continue;
                }
                match tokens.get_valid_token().await {
                    Ok(_) => debug!("Proactive refresh check passed"),
                    Err(ApiError::Offline) => debug!("Proactive refresh skipped while offline"),
                    Err(err) => warn!(error = %err, "Proactive refresh failed"),
                }
            }
        }
    }
}
