//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! ProxyRequest (body buffered)
//!     → select: LoadBalancer over eligible machines, minus those already tried
//!     → acquire connection guard
//!     → forward.rs, retried on the same machine (RetryPolicy, linear backoff)
//!         every attempt reported to the machine's circuit breaker
//!     → success: record latency, return response unchanged
//!     → exhausted: release guard, exclude machine, select again
//!     → 503 when nothing is eligible or the failover budget is spent
//! ```

pub mod forward;

use std::sync::Arc;
use std::time::{Duration, Instant};
use axum::body::Body;
use axum::http::Response;

use crate::config::BalancerConfig;
use crate::error::BalancerError;
use crate::http::client::HttpClient;
use crate::load_balancer::{LeastLoad, LoadBalancer, Machine, MachineId, MachineRegistry};
use crate::observability::metrics;
use crate::resilience::{BreakerPolicy, RetryPolicy};

pub use forward::{ForwardError, ProxyRequest};

#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<MachineRegistry>,
    selector: Box<dyn LoadBalancer>,
    client: HttpClient,
    retry: RetryPolicy,
    breaker: BreakerPolicy,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<MachineRegistry>, config: &BalancerConfig, client: HttpClient) -> Self {
        Self {
            registry,
            selector: Box::new(LeastLoad::new()),
            client,
            retry: RetryPolicy::from(&config.resilience),
            breaker: BreakerPolicy::from(&config.circuit_breaker),
            timeout: config.resilience.request_timeout(),
        }
    }

    /// Replace the selection strategy.
    pub fn with_selector(mut self, selector: Box<dyn LoadBalancer>) -> Self {
        self.selector = selector;
        self
    }

    /// Pick the best eligible machine that is not in `exclude`.
    pub fn select(&self, exclude: &[MachineId]) -> Result<Arc<Machine>, BalancerError> {
        let candidates: Vec<_> = self
            .registry
            .list_eligible()
            .filter(|m| !exclude.contains(m.id()))
            .collect();
        self.selector
            .next_server(&candidates)
            .ok_or(BalancerError::NoMachineAvailable)
    }

    /// Forward `request`, retrying and failing over within the attempt budget.
    pub async fn dispatch(&self, request: &ProxyRequest) -> Result<Response<Body>, BalancerError> {
        let mut tried: Vec<MachineId> = Vec::new();
        let mut attempts = 0u32;

        loop {
            let machine = match self.select(&tried) {
                Ok(machine) => machine,
                Err(e) if tried.is_empty() => return Err(e),
                Err(_) => {
                    tracing::warn!(attempts, machines = tried.len(), "No machines left to fail over to");
                    return Err(BalancerError::DispatchFailed { attempts });
                }
            };

            match self.dispatch_to(&machine, request, &mut attempts).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(
                        machine = %machine.id(),
                        error = %e,
                        attempts,
                        "Machine exhausted its retries"
                    );
                    tried.push(machine.id().clone());
                }
            }

            // The first machine is not a failover; each one after it is.
            if tried.len() as u32 > self.retry.max_attempts {
                return Err(BalancerError::DispatchFailed { attempts });
            }
            metrics::record_failover();
        }
    }

    async fn dispatch_to(
        &self,
        machine: &Arc<Machine>,
        request: &ProxyRequest,
        attempts: &mut u32,
    ) -> Result<Response<Body>, ForwardError> {
        let _guard = machine.acquire();
        let started = Instant::now();

        let result = self
            .retry
            .retry(|attempt| {
                *attempts += 1;
                self.attempt(machine, request, attempt)
            })
            .await;

        if result.is_ok() {
            machine.set_last_response_time(started.elapsed());
        }
        result
    }

    async fn attempt(
        &self,
        machine: &Machine,
        request: &ProxyRequest,
        attempt: u32,
    ) -> Result<Response<Body>, ForwardError> {
        let outcome = forward::forward_once(&self.client, machine, request, self.timeout).await;
        match &outcome {
            Ok(response) => {
                tracing::debug!(
                    machine = %machine.id(),
                    attempt,
                    status = %response.status(),
                    "Forwarded request"
                );
                machine.mark_success(&self.breaker);
                metrics::record_attempt(machine.id(), "success");
            }
            Err(e) => {
                tracing::warn!(machine = %machine.id(), attempt, error = %e, "Forward attempt failed");
                machine.mark_failure(&self.breaker);
                metrics::record_attempt(machine.id(), e.kind());
            }
        }
        outcome
    }
}
