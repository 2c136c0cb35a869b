//! HTTP transport abstraction
//!
//! The engine never talks to reqwest directly: every component takes an
//! [`HttpTransport`] and issues [`ApiRequest`]s through it. That keeps the
//! transfer state machines testable against scripted transports, and keeps
//! the retry policy in exactly one place.
//!
//! Retry semantics: 5xx, 429, and connection-level failures are retried
//! here with backoff. Every other status (including 308 and 4xx) is
//! returned to the caller untouched, because the state machines interpret
//! those themselves.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use gs_core::{Error, Result, RetryConfig, is_retryable_error, retry_with_backoff};

/// Fixed per-request deadline. Deadlines are per HTTP request, not per
/// logical transfer: a multi-chunk transfer may legitimately take far
/// longer than this while each chunk stays under it.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Request body forms the engine sends.
///
/// Bodies are bounded (at most one chunk) so a request can be replayed by
/// the transport-level retry without re-reading local state.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Json(serde_json::Value),
}

/// One HTTP request: a single primitive parameterized by method
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(v) = http::HeaderValue::from_str(value) {
            self.headers.insert(name, v);
        }
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }
}

/// Streamed response body
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// One HTTP response with a lazily-consumed body
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: BodyStream,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Build a response from an in-memory body (stubs, error paths)
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::new(status, headers, Box::pin(futures::stream::iter([Ok(bytes)])))
    }

    /// First value of a header, as UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Consume into the chunk stream (downloads)
    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// Collect the whole body
    pub async fn bytes(self) -> Result<Bytes> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(chunks.concat().into())
    }

    /// Collect and deserialize the body as JSON
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Map a non-success status to [`Error::Http`], draining the body into
    /// the error message. 404 becomes [`Error::NotFound`] so callers can
    /// distinguish it.
    pub async fn error_for_status(self) -> Result<ApiResponse> {
        if self.status.is_success() {
            return Ok(self);
        }
        let status = self.status;
        let body = self.bytes().await.unwrap_or_default();
        let body = String::from_utf8_lossy(&body).into_owned();
        if status == StatusCode::NOT_FOUND {
            Err(Error::NotFound(body))
        } else {
            Err(Error::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl std::fmt::Debug for ApiResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The injected HTTP collaborator
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request. Implementations handle transport-level retry;
    /// callers interpret statuses.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// reqwest-backed transport with pooling, per-request timeout, and
/// retry-with-backoff on transient failures
pub struct ReqwestTransport {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Self::with_retry(RetryConfig::default())
    }

    pub fn with_retry(retry: RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("gs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("building HTTP client: {e}")))?;
        Ok(Self { client, retry })
    }

    async fn send_once(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes.clone()),
            RequestBody::Json(value) => builder.json(value),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();

        // Surface retryable statuses as errors so the backoff loop sees them
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.bytes().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let body = response
            .bytes_stream()
            .map_err(|e| Error::Network(e.to_string()));
        Ok(ApiResponse::new(status, headers, Box::pin(body)))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        retry_with_backoff(
            &self.retry,
            || self.send_once(&request),
            is_retryable_error,
        )
        .await
    }
}
