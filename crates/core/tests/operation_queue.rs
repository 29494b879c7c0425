mod support;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use novem_core::{OperationQueue, QueueError, ReplayOutcome, ReplayTarget};
use novem_domain::constants::OFFLINE_QUEUE_KEY;
use novem_domain::{ApiError, HttpMethod, QueuedOperation};
use serde_json::{json, Value};
use support::MemoryStore;
use tokio::sync::Semaphore;

/// Replay target that answers from a script keyed by endpoint.
#[derive(Default)]
struct RecordingTarget {
    seen: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, ApiError)>>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingTarget {
    fn failing(endpoint: &str, error: ApiError) -> Self {
        let target = Self::default();
        target.failures.lock().unwrap().push((endpoint.to_string(), error));
        target
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplayTarget for RecordingTarget {
    async fn replay_operation(&self, operation: &QueuedOperation) -> Result<Value, ApiError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.seen.lock().unwrap().push(operation.endpoint.clone());
        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(endpoint, _)| *endpoint == operation.endpoint)
            .map(|(_, err)| err.clone());
        match failure {
            Some(err) => Err(err),
            None => Ok(json!({ "ok": true })),
        }
    }
}

fn op(endpoint: &str) -> QueuedOperation {
    QueuedOperation::new(HttpMethod::Post, endpoint, Some(json!({ "name": endpoint })), Utc::now())
}

async fn queue_with(endpoints: &[&str]) -> (OperationQueue, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let queue = OperationQueue::new(store.clone());
    for endpoint in endpoints {
        queue.enqueue(op(endpoint)).await;
    }
    (queue, store)
}

#[tokio::test]
async fn replays_in_fifo_order() {
    let (queue, store) = queue_with(&["/a/", "/b/", "/c/"]).await;
    let target = RecordingTarget::default();

    let report = queue.replay(&target).await;

    assert_eq!(report.outcome, ReplayOutcome::Completed);
    assert_eq!(target.seen(), vec!["/a/", "/b/", "/c/"]);
    assert_eq!(report.replayed(), 3);
    assert_eq!(report.remaining, 0);
    assert!(queue.is_empty());
    assert!(store.value(OFFLINE_QUEUE_KEY).is_none());
}

#[tokio::test]
async fn empty_queue_completes_immediately() {
    let (queue, _) = queue_with(&[]).await;
    let report = queue.replay(&RecordingTarget::default()).await;
    assert_eq!(report.outcome, ReplayOutcome::Completed);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn rejected_operation_blocks_the_rest() {
    let (queue, _) = queue_with(&["/a/", "/b/", "/c/"]).await;
    let rejection = ApiError::Validation { status: 400, payload: json!({ "name": ["taken"] }) };
    let target = RecordingTarget::failing("/b/", rejection.clone());

    let report = queue.replay(&target).await;

    assert_eq!(report.outcome, ReplayOutcome::Blocked);
    assert_eq!(target.seen(), vec!["/a/", "/b/"]);
    assert_eq!(report.failure().unwrap().result, Err(rejection));
    assert_eq!(report.remaining, 2);

    let remaining = queue.snapshot();
    assert_eq!(remaining[0].endpoint, "/b/");
    assert_eq!(remaining[0].attempts, 1);
    assert_eq!(remaining[1].endpoint, "/c/");
    assert_eq!(remaining[1].attempts, 0);
}

#[tokio::test]
async fn network_failure_interrupts_without_losing_operations() {
    let (queue, _) = queue_with(&["/a/", "/b/"]).await;
    let target =
        RecordingTarget::failing("/a/", ApiError::Unreachable { message: "timeout".into() });

    let report = queue.replay(&target).await;

    assert_eq!(report.outcome, ReplayOutcome::Interrupted);
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.snapshot()[0].attempts, 0);
}

#[tokio::test]
async fn gateway_error_interrupts_replay() {
    let (queue, _) = queue_with(&["/a/"]).await;
    let target =
        RecordingTarget::failing("/a/", ApiError::Server { status: 502, payload: Value::Null });

    let report = queue.replay(&target).await;

    assert_eq!(report.outcome, ReplayOutcome::Interrupted);
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn duplicates_are_all_replayed() {
    let (queue, _) = queue_with(&["/projects/1/", "/projects/1/"]).await;
    let target = RecordingTarget::default();

    queue.replay(&target).await;

    assert_eq!(target.seen().len(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn concurrent_replay_reports_already_running() {
    let (queue, _) = queue_with(&["/a/"]).await;
    let queue = Arc::new(queue);
    let gate = Arc::new(Semaphore::new(0));
    let target = Arc::new(RecordingTarget { gate: Some(gate.clone()), ..Default::default() });

    let first = {
        let (queue, target) = (Arc::clone(&queue), Arc::clone(&target));
        tokio::spawn(async move { queue.replay(&*target).await })
    };
    while !queue.is_replaying() {
        tokio::task::yield_now().await;
    }

    let second = queue.replay(&*target).await;
    assert_eq!(second.outcome, ReplayOutcome::AlreadyRunning);

    gate.add_permits(1);
    assert_eq!(first.await.unwrap().outcome, ReplayOutcome::Completed);
    assert!(!queue.is_replaying());
}

#[tokio::test]
async fn queue_survives_restart_through_store() {
    let (queue, store) = queue_with(&["/a/", "/b/"]).await;
    let original = queue.snapshot();

    let reloaded = OperationQueue::new(store.clone());
    assert_eq!(reloaded.load().await.unwrap(), 2);
    assert_eq!(reloaded.snapshot(), original);
}

#[tokio::test]
async fn discard_and_clear_update_store() {
    let (queue, store) = queue_with(&["/a/", "/b/"]).await;
    let first = queue.snapshot()[0].id;

    assert!(queue.discard(first).await);
    assert!(!queue.discard(first).await);
    let persisted: Vec<QueuedOperation> =
        serde_json::from_str(&store.value(OFFLINE_QUEUE_KEY).unwrap()).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].endpoint, "/b/");

    queue.clear().await;
    assert!(queue.is_empty());
    assert!(store.value(OFFLINE_QUEUE_KEY).is_none());
}

#[tokio::test]
async fn corrupt_persisted_queue_is_reported() {
    let store = Arc::new(MemoryStore::default());
    store.insert(OFFLINE_QUEUE_KEY, "{not json");
    let queue = OperationQueue::new(store);

    assert!(matches!(queue.load().await, Err(QueueError::Corrupt(_))));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn enqueue_keeps_memory_when_store_fails() {
    let store = Arc::new(MemoryStore::default());
    store.fail_writes(true);
    let queue = OperationQueue::new(store.clone());

    let id = queue.enqueue(op("/a/")).await;

    assert_eq!(queue.snapshot()[0].id, id);
    assert!(store.value(OFFLINE_QUEUE_KEY).is_none());
}
