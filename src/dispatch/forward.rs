//! Single forward attempt to one machine.

use std::time::Duration;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, Response, StatusCode};
use thiserror::Error;

use crate::http::client::HttpClient;
use crate::load_balancer::machine::Machine;
use crate::resilience::timeouts::{Elapsed, with_timeout};

/// An inbound request with its body buffered, so it can be replayed.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The inbound body exceeded the configured limit or could not be read.
#[derive(Debug, Error)]
#[error("failed to buffer request body: {0}")]
pub struct BodyError(String);

impl ProxyRequest {
    /// Buffer `request`, reading at most `limit` body bytes.
    pub async fn buffer(request: Request<Body>, limit: usize) -> Result<Self, BodyError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| BodyError(e.to_string()))?;
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Ok(Self {
            method: parts.method,
            path_and_query,
            headers: parts.headers,
            body,
        })
    }
}

/// Why a forward attempt counted as a failure.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("{0}")]
    Timeout(#[from] Elapsed),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("upstream returned {0}")]
    Status(StatusCode),
    #[error("invalid upstream request: {0}")]
    Request(String),
}

impl ForwardError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Upstream(_) => "upstream",
            ForwardError::Status(_) => "status",
            ForwardError::Request(_) => "request",
        }
    }
}

/// Only 2xx and 3xx responses count as a successful attempt.
pub fn is_success_status(status: StatusCode) -> bool {
    status.is_success() || status.is_redirection()
}

/// Forward `request` to `machine` once. Both the response head and body must
/// arrive within `timeout`.
pub async fn forward_once(
    client: &HttpClient,
    machine: &Machine,
    request: &ProxyRequest,
    timeout: Duration,
) -> Result<Response<Body>, ForwardError> {
    let uri = machine.url_for(&request.path_and_query);
    let mut builder = Request::builder().method(request.method.clone()).uri(uri.as_str());
    if let Some(headers) = builder.headers_mut() {
        *headers = request.headers.clone();
    }
    let outbound = builder
        .body(Body::from(request.body.clone()))
        .map_err(|e| ForwardError::Request(e.to_string()))?;

    with_timeout(timeout, async {
        let response = client
            .request(outbound)
            .await
            .map_err(|e| ForwardError::Upstream(e.to_string()))?;

        let status = response.status();
        if !is_success_status(status) {
            return Err(ForwardError::Status(status));
        }

        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(Body::new(body), usize::MAX)
            .await
            .map_err(|e| ForwardError::Upstream(e.to_string()))?;
        Ok::<_, ForwardError>(Response::from_parts(parts, Body::from(bytes)))
    })
    .await?
}
