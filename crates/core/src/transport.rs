//! Outbound HTTP seam. Vendor adaptors describe requests as [`HttpRequest`]
//! values and hand them to a [`Transport`]; [`HttpTransport`] is the reqwest
//! implementation and [`MemoryTransport`] records requests in memory.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::{CapiError, CapiResult, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully described vendor request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    /// JSON POST.
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// First header value matching `name` (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Executes a single request. No retries: one call, one attempt.
pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;
}

/// reqwest-backed transport shared by all vendor clients.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> CapiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| CapiError::Config(format!("invalid http.user_agent: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| CapiError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn execute(&self, request: HttpRequest) -> Result<Value, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;

        let status = response.status();
        debug!(url = %request.url, status = status.as_u16(), "vendor responded");

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl<T: Transport> Transport for Arc<T> {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send {
        (**self).execute(request)
    }
}

/// In-memory transport: records every request and answers from a queue of
/// canned responses, falling back to a fixed answer when the queue is empty.
#[derive(Debug)]
pub struct MemoryTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<Result<Value, TransportError>>>,
    fallback: Result<Value, TransportError>,
}

impl MemoryTransport {
    /// Answers every request with `{}`.
    pub fn new() -> Self {
        Self::with_fallback(Ok(Value::Object(Default::default())))
    }

    /// Answers every request with the given HTTP failure.
    pub fn failing(status: u16, body: impl Into<String>) -> Self {
        Self::with_fallback(Err(TransportError::Status {
            status,
            body: body.into(),
        }))
    }

    pub fn with_fallback(fallback: Result<Value, TransportError>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    /// Queue a response for the next unanswered request.
    pub fn push_response(&self, response: Result<Value, TransportError>) {
        self.responses.lock().push_back(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    async fn execute(&self, request: HttpRequest) -> Result<Value, TransportError> {
        self.requests.lock().push(request);
        let queued = self.responses.lock().pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Outcome of a conversion send. Failures are returned, not raised, so the
/// caller decides whether to log, retry or ignore.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Delivery {
    Sent(Value),
    Failed(TransportError),
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent(_))
    }

    pub fn response(&self) -> Option<&Value> {
        match self {
            Delivery::Sent(value) => Some(value),
            Delivery::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&TransportError> {
        match self {
            Delivery::Sent(_) => None,
            Delivery::Failed(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<Value, TransportError> {
        match self {
            Delivery::Sent(value) => Ok(value),
            Delivery::Failed(err) => Err(err),
        }
    }
}

impl From<Result<Value, TransportError>> for Delivery {
    fn from(result: Result<Value, TransportError>) -> Self {
        match result {
            Ok(value) => Delivery::Sent(value),
            Err(err) => Delivery::Failed(err),
        }
    }
}
