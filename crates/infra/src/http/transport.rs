use std::time::Duration;

use async_trait::async_trait;
use novem_core::{Transport, TransportError};
use novem_domain::constants::{DEFAULT_API_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use novem_domain::{ApiConfig, HttpMethod, HttpRequest, HttpResponse, NovemError};
use reqwest::{Client as ReqwestClient, Method};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::errors::InfraError;

/// [`Transport`] backed by a reqwest client.
///
/// Sends exactly one request per call. Retries, token refresh and offline
/// handling live in the request pipeline.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
    base_url: String,
}

impl ReqwestTransport {
    /// Start building a new transport.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Transport for the configured backend.
    pub fn from_config(config: &ApiConfig) -> Result<Self, NovemError> {
        Self::builder().base_url(&config.base_url).timeout(config.timeout()).build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.url_for(&request.path);
        let mut builder = self.client.request(to_method(request.method), &url);

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let request = builder.build().map_err(|err| TransportError::InvalidRequest(err.to_string()))?;

        debug!(%url, "sending HTTP request");
        let response = self.client.execute(request).await.map_err(|err| {
            debug!(%url, error = %err, "HTTP request failed");
            TransportError::NoResponse(NovemError::from(InfraError::from(err)).to_string())
        })?;

        let status = response.status().as_u16();
        debug!(%url, status, "received HTTP response");

        // A dropped connection mid-body still means no usable answer arrived
        let bytes = response
            .bytes()
            .await
            .map_err(|err| TransportError::NoResponse(format!("response body lost: {err}")))?;

        Ok(HttpResponse::new(status, parse_body(&bytes)))
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Empty bodies become `null`; bodies that are not JSON are kept as a string.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: None,
            default_headers: None,
        }
    }
}

impl ReqwestTransportBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<ReqwestTransport, NovemError> {
        let parsed = Url::parse(&self.base_url).map_err(|err| {
            NovemError::Config(format!("invalid API base URL '{}': {err}", self.base_url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NovemError::Config(format!(
                "unsupported API base URL scheme: {}",
                parsed.scheme()
            )));
        }

        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            NovemError::from(infra)
        })?;

        Ok(ReqwestTransport { client, base_url: self.base_url.trim_end_matches('/').to_string() })
    }
}
