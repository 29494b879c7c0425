//! Request pipeline
//!
//! The single entry point for backend calls. Attaches a valid bearer token,
//! sends the request, and turns every failure into an [`ApiError`]:
//!
//! | condition                              | result                          |
//! |----------------------------------------|---------------------------------|
//! | `EXPIRED` and mutating                 | `GracePeriodExpired`, no attempt |
//! | no response, `GRACE_PERIOD`, mutating  | queued, `OfflineQueued`         |
//! | no response, read                      | `Unreachable`                   |
//! | no response, `EXPIRED`                 | `GracePeriodExpired`            |
//! | 401                                    | refresh, retry once             |
//! | 401 after retry                        | `AuthExpired`                   |
//! | 403                                    | `Forbidden`                     |
//! | 5xx                                    | `Server`                        |
//! | other 4xx                              | `Validation`                    |
//! | 1xx / 3xx                              | `UnexpectedStatus`              |

use std::sync::Arc;

use async_trait::async_trait;
use novem_common::SharedClock;
use novem_domain::constants::HEALTH_PATH;
use novem_domain::{
    is_gateway_status, ApiError, ConnectivityState, HttpMethod, HttpRequest, HttpResponse,
    QueuedOperation,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::auth::token_manager::TokenLifecycleManager;
use crate::connectivity::ConnectivityMachine;
use crate::ports::{Transport, TransportError};
use crate::queue::{OperationQueue, ReplayReport, ReplayTarget};

/// Whether a call that cannot reach the backend may be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Queueable,
    /// Replays and calls that must not be deferred (account deletion)
    Direct,
}

pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenLifecycleManager>,
    connectivity: Arc<ConnectivityMachine>,
    queue: Arc<OperationQueue>,
    clock: SharedClock,
}

impl RequestPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenLifecycleManager>,
        connectivity: Arc<ConnectivityMachine>,
        queue: Arc<OperationQueue>,
        clock: SharedClock,
    ) -> Self {
        Self { transport, tokens, connectivity, queue, clock }
    }

    /// Send an authenticated request and decode the response body into `T`.
    ///
    /// `204`/`205` responses decode from JSON `null`.
    #[instrument(skip(self, body), fields(method = %method, path = %path))]
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let value = self.dispatch(method, path, body, Delivery::Queueable).await?;
        decode(value)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(HttpMethod::Get, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(HttpMethod::Post, path, Some(encode(body)?)).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(HttpMethod::Put, path, Some(encode(body)?)).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(HttpMethod::Patch, path, Some(encode(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(HttpMethod::Delete, path, None).await
    }

    /// Send a request that is never queued, even during the grace period.
    pub async fn execute_direct(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        self.dispatch(method, path, body, Delivery::Direct).await
    }

    /// Unauthenticated health check. Any answer marks the backend reachable
    /// and starts a replay pass.
    #[instrument(skip(self))]
    pub async fn reconnect(&self) -> Result<ReplayReport, ApiError> {
        let response = match self.transport.send(HttpRequest::new(HttpMethod::Get, HEALTH_PATH)).await
        {
            Ok(response) => response,
            Err(TransportError::NoResponse(message)) => {
                self.connectivity.record_failure();
                debug!(error = %message, "Health check got no response");
                return Err(ApiError::Unreachable { message });
            }
            Err(TransportError::InvalidRequest(message)) => {
                return Err(ApiError::Config { message });
            }
        };

        self.connectivity.record_response(response.status);
        if is_gateway_status(response.status) {
            return Err(ApiError::Unreachable {
                message: format!("health check returned {}", response.status),
            });
        }

        Ok(self.replay_pending().await)
    }

    /// Replay the offline queue through this pipeline.
    pub async fn replay_pending(&self) -> ReplayReport {
        self.queue.replay(self).await
    }

    async fn dispatch(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        delivery: Delivery,
    ) -> Result<Value, ApiError> {
        if method.is_mutating() && self.connectivity.state() == ConnectivityState::Expired {
            return Err(ApiError::GracePeriodExpired);
        }

        let mut token = match self.tokens.get_valid_token().await {
            Ok(token) => token,
            Err(ApiError::Offline) => {
                return self
                    .defer(method, path, body, delivery, "no usable access token while offline")
                    .await;
            }
            Err(err) => return Err(err),
        };

        let mut retried = false;
        loop {
            let request =
                HttpRequest::new(method, path).with_body(body.clone()).with_bearer(token.as_str());

            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(TransportError::NoResponse(message)) => {
                    self.connectivity.record_failure();
                    return self.defer(method, path, body, delivery, &message).await;
                }
                Err(TransportError::InvalidRequest(message)) => {
                    return Err(ApiError::Config { message });
                }
            };

            self.connectivity.record_response(response.status);

            if response.status == 401 {
                if retried {
                    warn!("Request rejected again after token refresh");
                    return Err(ApiError::AuthExpired);
                }
                retried = true;
                debug!("Request unauthorized, refreshing token");
                token = match self.tokens.refresh_on_unauthorized(token.as_str()).await {
                    Ok(token) => token,
                    Err(ApiError::Offline) => {
                        return self
                            .defer(method, path, body, delivery, "token refresh unreachable")
                            .await;
                    }
                    Err(err) => return Err(err),
                };
                continue;
            }

            return interpret(response);
        }
    }

    /// Recover from "backend unreachable" according to the connectivity state.
    async fn defer(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        delivery: Delivery,
        message: &str,
    ) -> Result<Value, ApiError> {
        let state = self.connectivity.state();
        if state == ConnectivityState::Expired {
            return Err(ApiError::GracePeriodExpired);
        }

        if method.is_mutating()
            && delivery == Delivery::Queueable
            && state == ConnectivityState::GracePeriod
        {
            let operation = QueuedOperation::new(method, path, body, self.clock.now());
            let operation_id = self.queue.enqueue(operation).await;
            return Err(ApiError::OfflineQueued { operation_id });
        }

        Err(ApiError::Unreachable { message: message.to_string() })
    }
}

#[async_trait]
impl ReplayTarget for RequestPipeline {
    async fn replay_operation(&self, operation: &QueuedOperation) -> Result<Value, ApiError> {
        self.dispatch(
            operation.method,
            &operation.endpoint,
            operation.body.clone(),
            Delivery::Direct,
        )
        .await
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("connectivity", &self.connectivity)
            .field("queue", &self.queue)
            .finish()
    }
}

/// Map a non-success status to its error.
pub fn error_for_status(status: u16, payload: Value) -> ApiError {
    match status {
        401 => ApiError::AuthExpired,
        403 => ApiError::Forbidden { payload },
        500..=u16::MAX => ApiError::Server { status, payload },
        400..=499 => ApiError::Validation { status, payload },
        _ => ApiError::UnexpectedStatus { status },
    }
}

fn interpret(response: HttpResponse) -> Result<Value, ApiError> {
    match response.status {
        204 | 205 => Ok(Value::Null),
        200..=299 => Ok(response.body),
        status => Err(error_for_status(status, response.body)),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode { message: e.to_string() })
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Config {
        message: format!("request body could not be encoded: {e}"),
    })
}
