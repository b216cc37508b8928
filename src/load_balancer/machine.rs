//! Machine abstraction.
//!
//! # Responsibilities
//! - Represent a single registered backend machine
//! - Track in-flight connections (for load-based selection)
//! - Track last response time (selection tie-breaker)
//! - Own the machine's circuit breaker

use url::Url;
use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::BalancerError;
use crate::observability::metrics;
use crate::resilience::{BreakerPolicy, CircuitBreaker, CircuitState, MachineStatus, Transition};

/// Identity of a machine: its host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MachineId {
    pub host: String,
    pub port: u16,
}

impl MachineId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for MachineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The parsed URL must point at exactly `id`: a host with `/`, `?`, `#` or `@`
/// in it would otherwise move the port into the path or the userinfo.
fn addresses_same_endpoint(url: &Url, id: &MachineId) -> bool {
    url.host_str()
        .is_some_and(|host| !host.is_empty() && host.eq_ignore_ascii_case(&id.host))
        && url.port_or_known_default() == Some(id.port)
        && url.username().is_empty()
        && url.password().is_none()
        && url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none()
}

/// A single backend machine.
#[derive(Debug)]
pub struct Machine {
    id: MachineId,
    /// `http://host:port/`, validated at construction.
    base_url: Url,
    /// Maximum concurrent connections allowed.
    max_connections: usize,
    /// Number of in-flight requests.
    connections: AtomicUsize,
    /// Duration of the last completed request or probe, in microseconds.
    last_response_micros: AtomicU64,
    /// Registration order, used to keep selection stable.
    seq: u64,
    breaker: Mutex<CircuitBreaker>,
}

impl Machine {
    /// Create a new machine. Fails if `host` and `port` do not form a usable URL.
    pub fn new(id: MachineId, max_connections: usize, seq: u64) -> Result<Self, BalancerError> {
        let base_url = Url::parse(&format!("http://{}/", id))
            .map_err(|e| BalancerError::InvalidInput(format!("address {}: {}", id, e)))?;
        if !addresses_same_endpoint(&base_url, &id) {
            return Err(BalancerError::InvalidInput(format!(
                "address {}: host must be a bare hostname or IPv4 address",
                id
            )));
        }

        Ok(Self {
            id,
            base_url,
            max_connections,
            connections: AtomicUsize::new(0),
            last_response_micros: AtomicU64::new(0),
            seq,
            breaker: Mutex::new(CircuitBreaker::new()),
        })
    }

    pub fn id(&self) -> &MachineId {
        &self.id
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// URL for `path_and_query` on this machine, preserved verbatim.
    pub fn url_for(&self, path_and_query: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        if path_and_query.starts_with('/') {
            format!("{}{}", base, path_and_query)
        } else {
            format!("{}/{}", base, path_and_query)
        }
    }

    /// Get the current number of in-flight requests.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn has_capacity(&self) -> bool {
        self.connections() < self.max_connections
    }

    pub fn last_response_time(&self) -> Duration {
        Duration::from_micros(self.last_response_micros.load(Ordering::Relaxed))
    }

    pub fn set_last_response_time(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.last_response_micros.store(micros, Ordering::Relaxed);
    }

    /// Take a connection slot; released when the guard drops.
    pub fn acquire(self: &Arc<Self>) -> MachineConnectionGuard {
        let now = self.connections.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::record_machine_connections(&self.id, now);
        MachineConnectionGuard {
            machine: self.clone(),
        }
    }

    fn release(&self) {
        // Saturating: the count never wraps below zero.
        let prev = self
            .connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        metrics::record_machine_connections(&self.id, prev.saturating_sub(1));
    }

    // --- Circuit breaker ---

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CircuitState {
        self.breaker().state()
    }

    pub fn status(&self) -> MachineStatus {
        self.breaker().status()
    }

    pub fn failure_count(&self) -> u32 {
        self.breaker().failure_count()
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.breaker().last_failure()
    }

    /// Active and breaker closed or half-open.
    pub fn is_eligible(&self) -> bool {
        self.breaker().is_eligible()
    }

    /// Report a successful probe or request.
    pub fn mark_success(&self, policy: &BreakerPolicy) -> Option<Transition> {
        let transition = self.breaker().on_success(policy, Instant::now());
        if let Some(t) = transition {
            tracing::info!(machine = %self.id, from = %t.from, to = %t.to, "Circuit breaker transition");
            metrics::record_circuit_state(&self.id, t.to);
        }
        transition
    }

    /// Report a failed probe or request.
    pub fn mark_failure(&self, policy: &BreakerPolicy) -> Option<Transition> {
        let (transition, failures) = {
            let mut breaker = self.breaker();
            let t = breaker.on_failure(policy, Instant::now());
            (t, breaker.failure_count())
        };
        if let Some(t) = transition {
            tracing::warn!(
                machine = %self.id,
                from = %t.from,
                to = %t.to,
                failures,
                "Circuit breaker transition"
            );
            metrics::record_circuit_state(&self.id, t.to);
        }
        transition
    }

    /// Point-in-time view for listings.
    pub fn snapshot(&self) -> MachineSnapshot {
        let breaker = self.breaker().clone();
        MachineSnapshot {
            host: self.id.host.clone(),
            port: self.id.port,
            max_connections: self.max_connections,
            connections: self.connections(),
            last_response_time_ms: self.last_response_time().as_millis() as u64,
            status: breaker.status(),
            circuit_breaker_status: breaker.state(),
            failure_count: breaker.failure_count(),
            last_failure_ms_ago: breaker
                .last_failure()
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }
}

/// Serializable view of a machine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSnapshot {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub connections: usize,
    pub last_response_time_ms: u64,
    pub status: MachineStatus,
    pub circuit_breaker_status: CircuitState,
    pub failure_count: u32,
    pub last_failure_ms_ago: Option<u64>,
}

/// A RAII guard that manages the in-flight connection count.
#[derive(Debug)]
pub struct MachineConnectionGuard {
    machine: Arc<Machine>,
}

impl Deref for MachineConnectionGuard {
    type Target = Arc<Machine>;
    fn deref(&self) -> &Self::Target {
        &self.machine
    }
}

impl Drop for MachineConnectionGuard {
    fn drop(&mut self) {
        self.machine.release();
    }
}
