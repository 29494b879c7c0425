//! Offline operation queue
//!
//! Mutating calls that fail for network reasons during the grace period are
//! appended here and replayed in arrival order once the backend is reachable.
//! The queue is mirrored to the session store after every change so it
//! survives a restart.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use novem_domain::constants::OFFLINE_QUEUE_KEY;
use novem_domain::{ApiError, NovemError, QueuedOperation};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ports::SessionStore;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to read persisted queue: {0}")]
    Storage(#[from] NovemError),

    #[error("persisted queue is corrupt: {0}")]
    Corrupt(String),
}

/// Something that can send a queued operation to the backend.
#[async_trait]
pub trait ReplayTarget: Send + Sync {
    async fn replay_operation(&self, operation: &QueuedOperation) -> Result<Value, ApiError>;
}

/// How a replay pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayOutcome {
    /// Every operation was accepted (or the queue was empty)
    Completed,
    /// The backend became unreachable; the rest stays queued
    Interrupted,
    /// An operation was rejected; it and everything behind it stay queued
    Blocked,
    /// Another pass was already running
    AlreadyRunning,
}

/// Result of replaying one operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub id: Uuid,
    pub result: Result<Value, ApiError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub outcome: ReplayOutcome,
    pub results: Vec<OperationResult>,
    /// Operations still queued after the pass
    pub remaining: usize,
}

impl ReplayReport {
    /// Number of operations the backend accepted during the pass
    pub fn replayed(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_ok()).count()
    }

    /// The error that stopped the pass, if any
    pub fn failure(&self) -> Option<&OperationResult> {
        self.results.iter().find(|r| r.result.is_err())
    }
}

pub struct OperationQueue {
    store: Arc<dyn SessionStore>,
    operations: Mutex<VecDeque<QueuedOperation>>,
    replaying: AtomicBool,
    // Serializes store writes so the last write always carries the latest snapshot
    persist_lock: tokio::sync::Mutex<()>,
}

impl OperationQueue {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            operations: Mutex::new(VecDeque::new()),
            replaying: AtomicBool::new(false),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Reload the queue from the store, replacing the in-memory contents.
    /// Returns the number of operations loaded.
    pub async fn load(&self) -> Result<usize, QueueError> {
        let Some(raw) = self.store.get(OFFLINE_QUEUE_KEY).await? else {
            return Ok(0);
        };
        let loaded: VecDeque<QueuedOperation> =
            serde_json::from_str(&raw).map_err(|e| QueueError::Corrupt(e.to_string()))?;
        let count = loaded.len();
        *self.operations.lock() = loaded;
        debug!(count, "Loaded offline queue");
        Ok(count)
    }

    /// Append an operation. Arrival order is replay order.
    pub async fn enqueue(&self, operation: QueuedOperation) -> Uuid {
        let id = operation.id;
        info!(
            operation_id = %id,
            method = %operation.method,
            endpoint = %operation.endpoint,
            "Queued operation for replay"
        );
        self.operations.lock().push_back(operation);
        self.persist().await;
        id
    }

    /// Replay queued operations in FIFO order through `target`.
    pub async fn replay(&self, target: &dyn ReplayTarget) -> ReplayReport {
        if self.replaying.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err()
        {
            debug!("Replay already running");
            return ReplayReport {
                outcome: ReplayOutcome::AlreadyRunning,
                results: Vec::new(),
                remaining: self.len(),
            };
        }
        let _guard = ReplayGuard(&self.replaying);

        let mut results = Vec::new();
        let outcome = loop {
            let Some(operation) = self.operations.lock().front().cloned() else {
                break ReplayOutcome::Completed;
            };

            match target.replay_operation(&operation).await {
                Ok(value) => {
                    self.operations.lock().retain(|op| op.id != operation.id);
                    self.persist().await;
                    debug!(operation_id = %operation.id, "Replayed queued operation");
                    results.push(OperationResult { id: operation.id, result: Ok(value) });
                }
                Err(err) if is_network_failure(&err) => {
                    warn!(operation_id = %operation.id, error = %err, "Replay interrupted");
                    results.push(OperationResult { id: operation.id, result: Err(err) });
                    break ReplayOutcome::Interrupted;
                }
                Err(err) => {
                    if let Some(op) =
                        self.operations.lock().iter_mut().find(|op| op.id == operation.id)
                    {
                        op.attempts += 1;
                    }
                    self.persist().await;
                    warn!(
                        operation_id = %operation.id,
                        error = %err,
                        "Queued operation rejected, replay blocked"
                    );
                    results.push(OperationResult { id: operation.id, result: Err(err) });
                    break ReplayOutcome::Blocked;
                }
            }
        };

        let remaining = self.len();
        info!(?outcome, replayed = results.len(), remaining, "Replay pass finished");
        ReplayReport { outcome, results, remaining }
    }

    /// Copy of the queued operations, oldest first
    pub fn snapshot(&self) -> Vec<QueuedOperation> {
        self.operations.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.operations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.lock().is_empty()
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying.load(Ordering::Acquire)
    }

    /// Drop one operation, typically after the user gave up on a rejected
    /// change. Returns whether it was queued.
    pub async fn discard(&self, id: Uuid) -> bool {
        let removed = {
            let mut operations = self.operations.lock();
            let before = operations.len();
            operations.retain(|op| op.id != id);
            operations.len() != before
        };
        if removed {
            info!(operation_id = %id, "Discarded queued operation");
            self.persist().await;
        }
        removed
    }

    pub async fn clear(&self) {
        let dropped = std::mem::take(&mut *self.operations.lock()).len();
        if dropped > 0 {
            info!(dropped, "Cleared offline queue");
        }
        self.persist().await;
    }

    async fn persist(&self) {
        let _lock = self.persist_lock.lock().await;
        let snapshot = self.snapshot();

        let result = if snapshot.is_empty() {
            self.store.remove(OFFLINE_QUEUE_KEY).await
        } else {
            match serde_json::to_string(&snapshot) {
                Ok(json) => self.store.set(OFFLINE_QUEUE_KEY, &json).await,
                Err(e) => Err(NovemError::Internal(e.to_string())),
            }
        };

        if let Err(err) = result {
            warn!(error = %err, "Failed to persist offline queue");
        }
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("len", &self.len())
            .field("replaying", &self.is_replaying())
            .finish()
    }
}

fn is_network_failure(err: &ApiError) -> bool {
    err.is_connectivity_failure() || err.is_deferred()
}

struct ReplayGuard<'a>(&'a AtomicBool);

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
