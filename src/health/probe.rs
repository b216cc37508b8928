//! Single-machine health probe.
//!
//! # Classification
//! - Healthy: any response with status in [200, 500)
//! - Unhealthy: timeout, connection error, or status >= 500
//!
//! Probe errors never reach proxy clients; they only drive circuit breaker
//! transitions (or reject a registration).

use std::time::{Duration, Instant};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use thiserror::Error;

use crate::http::client::{HttpClient, build_client};
use crate::load_balancer::machine::Machine;
use crate::resilience::timeouts::{Elapsed, with_timeout};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Timeout(#[from] Elapsed),
    #[error("connection error: {0}")]
    Connect(String),
    #[error("unhealthy status {0}")]
    Status(StatusCode),
    #[error("invalid probe request: {0}")]
    Request(String),
}

impl ProbeError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Connect(_) => "connect",
            ProbeError::Status(_) => "status",
            ProbeError::Request(_) => "request",
        }
    }
}

/// Healthy iff the status is in [200, 500).
pub fn is_healthy_status(status: StatusCode) -> bool {
    (200..500).contains(&status.as_u16())
}

/// Issues bounded `GET <path>` probes.
#[derive(Clone)]
pub struct Prober {
    client: HttpClient,
    path: String,
    timeout: Duration,
}

impl Prober {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(build_client(), path, timeout)
    }

    pub fn with_client(client: HttpClient, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `machine` and return the round-trip latency on success.
    pub async fn probe(&self, machine: &Machine) -> Result<Duration, ProbeError> {
        let uri = machine.url_for(&self.path);
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_str())
            .header(header::USER_AGENT, "machine-balancer-health-check")
            .body(Body::empty())
            .map_err(|e| ProbeError::Request(e.to_string()))?;

        let started = Instant::now();
        let response = with_timeout(self.timeout, self.client.request(request))
            .await?
            .map_err(|e| ProbeError::Connect(e.to_string()))?;

        let status = response.status();
        if is_healthy_status(status) {
            Ok(started.elapsed())
        } else {
            Err(ProbeError::Status(status))
        }
    }
}
