use novem_core::ConnectivityProbe;
use tokio::sync::watch;
use tracing::info;

/// Probe driven by the embedding application (for example from OS network
/// change callbacks).
#[derive(Debug)]
pub struct ManualProbe {
    tx: watch::Sender<bool>,
}

impl ManualProbe {
    pub fn new(reachable: bool) -> Self {
        let (tx, _rx) = watch::channel(reachable);
        Self { tx }
    }

    /// Report reachability. Subscribers are only woken on a change.
    pub fn set_reachable(&self, reachable: bool) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != reachable;
            *current = reachable;
            changed
        });
        if changed {
            info!(reachable, "Network reachability changed");
        }
    }
}

impl Default for ManualProbe {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityProbe for ManualProbe {
    fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
