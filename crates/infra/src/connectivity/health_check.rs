use std::sync::Arc;
use std::time::Duration;

use novem_core::{ConnectivityProbe, Transport};
use novem_domain::constants::HEALTH_PATH;
use novem_domain::{is_gateway_status, HttpMethod, HttpRequest};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Probe that polls the unauthenticated health endpoint.
///
/// Any answer other than a gateway error counts as reachable. The poll task
/// runs until the probe is dropped or [`HealthCheckProbe::stop`] is called.
#[derive(Debug)]
pub struct HealthCheckProbe {
    tx: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HealthCheckProbe {
    /// Start polling. Must be called inside a tokio runtime.
    pub fn spawn(transport: Arc<dyn Transport>, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(true);
        let tx = Arc::new(tx);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(poll_loop(transport, interval, Arc::clone(&tx), cancel.clone()));

        Self { tx, cancel, handle }
    }

    /// Check reachability once, outside the poll schedule.
    pub async fn check_now(transport: &dyn Transport) -> bool {
        match transport.send(HttpRequest::new(HttpMethod::Get, HEALTH_PATH)).await {
            Ok(response) => !is_gateway_status(response.status),
            Err(err) => {
                debug!(error = %err, "Health check failed");
                false
            }
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for HealthCheckProbe {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ConnectivityProbe for HealthCheckProbe {
    fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

async fn poll_loop(
    transport: Arc<dyn Transport>,
    interval: Duration,
    tx: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Health check loop cancelled");
                break;
            }
            reachable = HealthCheckProbe::check_now(transport.as_ref()) => {
                let changed = tx.send_if_modified(|current| {
                    let changed = *current != reachable;
                    *current = reachable;
                    changed
                });
                if changed {
                    info!(reachable, "Backend reachability changed");
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Health check loop cancelled");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
