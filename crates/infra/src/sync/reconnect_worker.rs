//! Reconnection worker
//!
//! Replays the offline queue once the backend is reachable again. Three
//! triggers feed it:
//!
//! - the [`ConnectivityProbe`] flips from unreachable to reachable: run a
//!   health check through [`RequestPipeline::reconnect`]
//! - the [`ConnectivityMachine`] re-enters `ONLINE` (any request succeeded):
//!   replay pending operations
//! - while not `ONLINE`: poll the health check every `health_poll`
//!
//! The worker never changes the connectivity state itself; the pipeline
//! records every outcome.

use std::sync::Arc;
use std::time::Duration;

use novem_core::{ConnectivityMachine, ConnectivityProbe, ReplayOutcome, ReplayReport, RequestPipeline};
use novem_domain::constants::DEFAULT_HEALTH_POLL_SECS;
use novem_domain::ConnectivityState;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scheduling::{SchedulerError, SchedulerResult};

/// Configuration for the reconnection worker.
#[derive(Debug, Clone)]
pub struct ReconnectWorkerConfig {
    /// Health check interval while the backend is unreachable
    pub health_poll: Duration,
}

impl Default for ReconnectWorkerConfig {
    fn default() -> Self {
        Self { health_poll: Duration::from_secs(DEFAULT_HEALTH_POLL_SECS) }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ReconnectWorker {
    pipeline: Arc<RequestPipeline>,
    connectivity: Arc<ConnectivityMachine>,
    probe: Arc<dyn ConnectivityProbe>,
    config: ReconnectWorkerConfig,
    running: Mutex<Option<Running>>,
}

impl ReconnectWorker {
    pub fn new(
        pipeline: Arc<RequestPipeline>,
        connectivity: Arc<ConnectivityMachine>,
        probe: Arc<dyn ConnectivityProbe>,
        config: ReconnectWorkerConfig,
    ) -> Self {
        Self { pipeline, connectivity, probe, config, running: Mutex::new(None) }
    }

    /// Spawn the worker. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyRunning`] if the worker is active.
    pub fn start(&self) -> SchedulerResult<()> {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let context = LoopContext {
            pipeline: Arc::clone(&self.pipeline),
            machine: Arc::clone(&self.connectivity),
            connectivity: self.connectivity.subscribe(),
            reachability: self.probe.subscribe(),
            health_poll: self.config.health_poll,
        };
        let handle = tokio::spawn(run_loop(context, cancel.clone()));
        *running = Some(Running { cancel, handle });

        info!(health_poll_secs = self.config.health_poll.as_secs(), "Reconnect worker started");
        Ok(())
    }

    /// Cancel the worker. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };
        running.cancel.cancel();
        info!("Reconnect worker stopped");
        !running.handle.is_finished()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for ReconnectWorker {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for ReconnectWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectWorker")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

struct LoopContext {
    pipeline: Arc<RequestPipeline>,
    machine: Arc<ConnectivityMachine>,
    connectivity: watch::Receiver<ConnectivityState>,
    reachability: watch::Receiver<bool>,
    health_poll: Duration,
}

async fn run_loop(context: LoopContext, cancel: CancellationToken) {
    let LoopContext { pipeline, machine, mut connectivity, mut reachability, health_poll } =
        context;
    let mut last_state = *connectivity.borrow_and_update();
    let mut reachable = *reachability.borrow_and_update();
    let mut probe_open = true;

    loop {
        let online = last_state == ConnectivityState::Online;

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Reconnect loop cancelled");
                break;
            }
            changed = reachability.changed(), if probe_open => {
                if changed.is_err() {
                    debug!("Connectivity probe closed");
                    probe_open = false;
                    continue;
                }
                let now_reachable = *reachability.borrow_and_update();
                // A quick false/true pair can coalesce into one wake
                let restored = now_reachable && (!reachable || !machine.is_online());
                reachable = now_reachable;
                if restored {
                    info!("Network reachable again, checking backend");
                    attempt_reconnect(&pipeline).await;
                }
            }
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                // Only transitions are published, so seeing ONLINE here means
                // the backend came back, even if the GRACE_PERIOD value was
                // coalesced away.
                last_state = *connectivity.borrow_and_update();
                if last_state == ConnectivityState::Online {
                    log_report(&pipeline.replay_pending().await);
                }
            }
            _ = tokio::time::sleep(health_poll), if !online => {
                debug!("Polling backend health");
                attempt_reconnect(&pipeline).await;
            }
        }
    }
}

async fn attempt_reconnect(pipeline: &RequestPipeline) {
    match pipeline.reconnect().await {
        Ok(report) => log_report(&report),
        Err(err) => debug!(error = %err, "Backend still unreachable"),
    }
}

fn log_report(report: &ReplayReport) {
    match report.outcome {
        ReplayOutcome::Completed if report.results.is_empty() => {}
        ReplayOutcome::Completed => info!(replayed = report.replayed(), "Offline queue replayed"),
        ReplayOutcome::AlreadyRunning => debug!("Replay already in progress"),
        ReplayOutcome::Interrupted => {
            info!(replayed = report.replayed(), remaining = report.remaining, "Replay interrupted")
        }
        ReplayOutcome::Blocked => warn!(
            replayed = report.replayed(),
            remaining = report.remaining,
            error = ?report.failure().map(|f| &f.result),
            "Replay blocked by a rejected operation"
        ),
    }
}
