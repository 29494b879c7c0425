use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use novem_core::{Transport, TransportError};
use novem_domain::constants::REFRESH_PATH;
use novem_domain::{HttpMethod, HttpRequest, HttpResponse};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

type Handler = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// Scripted transport.
///
/// Responses come from queued one-shot responses for a route first, then
/// from the fallback handler. The whole backend can be taken offline, and
/// refresh requests can be held until the test releases them.
pub struct MockTransport {
    handler: Handler,
    scripted: Mutex<Vec<(HttpMethod, String, VecDeque<HttpResponse>)>>,
    requests: Mutex<Vec<HttpRequest>>,
    offline: AtomicBool,
    refresh_gate: Option<Arc<Semaphore>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            scripted: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            refresh_gate: None,
        }
    }

    /// Every request answers `200 {}`.
    pub fn ok() -> Self {
        Self::new(|_| HttpResponse::new(200, json!({})))
    }

    /// Hold refresh requests until permits are added to the returned gate.
    pub fn with_refresh_gate(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.refresh_gate = Some(gate.clone());
        (self, gate)
    }

    /// Queue a one-shot response for `method path`.
    pub fn script(&self, method: HttpMethod, path: &str, status: u16, body: Value) {
        let mut scripted = self.scripted.lock().unwrap();
        match scripted.iter_mut().find(|(m, p, _)| *m == method && p == path) {
            Some((_, _, queue)) => queue.push_back(HttpResponse::new(status, body)),
            None => scripted.push((
                method,
                path.to_string(),
                VecDeque::from([HttpResponse::new(status, body)]),
            )),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| r.method == method && r.path == path).count()
    }

    pub fn total(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn scripted_response(&self, request: &HttpRequest) -> Option<HttpResponse> {
        let mut scripted = self.scripted.lock().unwrap();
        scripted
            .iter_mut()
            .find(|(m, p, _)| *m == request.method && *p == request.path)
            .and_then(|(_, _, queue)| queue.pop_front())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        if request.path == REFRESH_PATH {
            if let Some(gate) = &self.refresh_gate {
                gate.acquire().await.expect("gate closed").forget();
            }
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::NoResponse("connection refused".into()));
        }

        Ok(self.scripted_response(&request).unwrap_or_else(|| (self.handler)(&request)))
    }
}
