//! Deferred write operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::http::HttpMethod;

/// A mutating call captured while the backend was unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: Uuid,
    pub method: HttpMethod,
    pub endpoint: String,
    #[serde(default)]
    pub body: Option<Value>,
    pub enqueued_at: DateTime<Utc>,
    /// Replay attempts that were rejected by the backend
    #[serde(default)]
    pub attempts: u32,
}

impl QueuedOperation {
    pub fn new(
        method: HttpMethod,
        endpoint: impl Into<String>,
        body: Option<Value>,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self { id: Uuid::now_v7(), method, endpoint: endpoint.into(), body, enqueued_at, attempts: 0 }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn persisted_form_round_trips_with_missing_optional_fields() {
        let op: QueuedOperation = serde_json::from_value(json!({
            "id": "0190b6c4-3c1e-7b9e-8f00-000000000001",
            "method": "PATCH",
            "endpoint": "/projects/1/",
            "enqueued_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(op.method, HttpMethod::Patch);
        assert_eq!(op.body, None);
        assert_eq!(op.attempts, 0);
    }

    #[test]
    fn ids_are_unique() {
        let now = Utc::now();
        let a = QueuedOperation::new(HttpMethod::Post, "/a/", None, now);
        let b = QueuedOperation::new(HttpMethod::Post, "/a/", None, now);
        assert_ne!(a.id, b.id);
    }
}
