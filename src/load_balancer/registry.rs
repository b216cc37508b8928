//! Machine registry.
//!
//! # Responsibilities
//! - Hold every registered machine, keyed by host and port
//! - Register (with an optional connectivity probe) and deregister machines
//! - Produce eligible snapshots for the selector and full listings for the
//!   health monitor
//!
//! The map is sharded (`DashMap`), and all per-machine mutation goes through the
//! machine itself, so there is no registry-wide lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;

use crate::config::MachineConfig;
use crate::error::BalancerError;
use crate::health::probe::Prober;
use crate::load_balancer::machine::{Machine, MachineId, MachineSnapshot};

/// Fields of a registration request. Every field is optional at the wire
/// level so that missing fields become `InvalidInput`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
}

impl Registration {
    pub fn new(host: impl Into<String>, port: u16, max_connections: usize) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            max_connections: Some(max_connections),
        }
    }

    /// Check presence and positivity of every field.
    pub fn validate(&self) -> Result<(MachineId, usize), BalancerError> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BalancerError::InvalidInput("host is required".into()))?;
        let port = self
            .port
            .filter(|p| *p > 0)
            .ok_or_else(|| BalancerError::InvalidInput("port must be a positive integer".into()))?;
        let max_connections = self
            .max_connections
            .filter(|m| *m > 0)
            .ok_or_else(|| {
                BalancerError::InvalidInput("maxConnections must be a positive integer".into())
            })?;
        Ok((MachineId::new(host, port), max_connections))
    }
}

/// Fields of a deregistration request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Deregistration {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Deregistration {
    pub fn validate(&self) -> Result<MachineId, BalancerError> {
        match (self.host.as_deref().map(str::trim), self.port) {
            (Some(host), Some(port)) if !host.is_empty() && port > 0 => Ok(MachineId::new(host, port)),
            _ => Err(BalancerError::InvalidInput("host and port are required".into())),
        }
    }
}

impl From<&MachineConfig> for Registration {
    fn from(config: &MachineConfig) -> Self {
        Self::new(config.host.clone(), config.port, config.max_connections)
    }
}

#[derive(Debug, Default)]
pub struct MachineRegistry {
    machines: DashMap<MachineId, Arc<Machine>>,
    next_seq: AtomicU64,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a machine without probing it (seed machines from configuration).
    pub fn add(&self, registration: Registration) -> Result<Arc<Machine>, BalancerError> {
        let (id, max_connections) = registration.validate()?;
        let machine = self.build(id, max_connections)?;
        self.insert(machine)
    }

    /// Register a machine.
    ///
    /// With a `prober`, the machine must answer a probe before it is added; the
    /// probe latency seeds its last response time.
    pub async fn register(
        &self,
        registration: Registration,
        prober: Option<&Prober>,
    ) -> Result<Arc<Machine>, BalancerError> {
        let (id, max_connections) = registration.validate()?;
        if self.machines.contains_key(&id) {
            return Err(BalancerError::DuplicateMachine(id));
        }
        let machine = self.build(id, max_connections)?;

        if let Some(prober) = prober {
            match prober.probe(&machine).await {
                Ok(latency) => machine.set_last_response_time(latency),
                Err(e) => {
                    tracing::warn!(machine = %machine.id(), error = %e, "Registration probe failed");
                    return Err(BalancerError::UnreachableMachine {
                        id: machine.id().clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.insert(machine)
    }

    fn build(&self, id: MachineId, max_connections: usize) -> Result<Arc<Machine>, BalancerError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        Machine::new(id, max_connections, seq).map(Arc::new)
    }

    fn insert(&self, machine: Arc<Machine>) -> Result<Arc<Machine>, BalancerError> {
        // Checked again under the shard lock; a concurrent registration may
        // have won while a probe was in flight.
        match self.machines.entry(machine.id().clone()) {
            Entry::Occupied(entry) => Err(BalancerError::DuplicateMachine(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::info!(
                    machine = %entry.key(),
                    max_connections = machine.max_connections(),
                    "Machine registered"
                );
                entry.insert(machine.clone());
                Ok(machine)
            }
        }
    }

    /// Remove a machine immediately. In-flight requests keep their own
    /// reference and finish normally.
    pub fn deregister(&self, id: &MachineId) -> Result<Arc<Machine>, BalancerError> {
        match self.machines.remove(id) {
            Some((_, machine)) => {
                tracing::info!(machine = %id, in_flight = machine.connections(), "Machine deregistered");
                Ok(machine)
            }
            None => Err(BalancerError::NotFound(id.clone())),
        }
    }

    pub fn get(&self, id: &MachineId) -> Option<Arc<Machine>> {
        self.machines.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Every machine, in registration order.
    pub fn all(&self) -> Vec<Arc<Machine>> {
        let mut machines: Vec<_> = self
            .machines
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        machines.sort_by_key(|m| m.seq());
        machines
    }

    /// Machines that are active with a closed or half-open breaker, in
    /// registration order, as of this call.
    pub fn list_eligible(&self) -> impl Iterator<Item = Arc<Machine>> {
        let mut eligible: Vec<_> = self
            .machines
            .iter()
            .filter(|entry| entry.value().is_eligible())
            .map(|entry| entry.value().clone())
            .collect();
        eligible.sort_by_key(|m| m.seq());
        eligible.into_iter()
    }

    pub fn snapshot(&self) -> Vec<MachineSnapshot> {
        self.all().iter().map(|m| m.snapshot()).collect()
    }
}
