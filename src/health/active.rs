//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered machine
//! - Feed each result into that machine's circuit breaker

use std::sync::Arc;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::{CircuitBreakerConfig, HealthCheckConfig};
use crate::health::probe::Prober;
use crate::load_balancer::machine::Machine;
use crate::load_balancer::registry::MachineRegistry;
use crate::observability::metrics;
use crate::resilience::BreakerPolicy;

pub struct HealthMonitor {
    registry: Arc<MachineRegistry>,
    config: HealthCheckConfig,
    policy: BreakerPolicy,
    prober: Prober,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<MachineRegistry>,
        config: HealthCheckConfig,
        breaker: &CircuitBreakerConfig,
        prober: Prober,
    ) -> Self {
        Self {
            registry,
            config,
            policy: BreakerPolicy::from(breaker),
            prober,
        }
    }

    /// Start the monitor on its own task. It stops when `shutdown` fires.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_ms = self.config.interval_ms,
            path = %self.prober.path(),
            timeout_ms = self.prober.timeout().as_millis() as u64,
            "Health monitor starting"
        );

        // First probe one interval after start.
        let interval = self.config.interval();
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered machine once, concurrently.
    pub async fn check_all(&self) {
        let machines = self.registry.all();
        if machines.is_empty() {
            return;
        }
        join_all(machines.iter().map(|machine| self.check_one(machine))).await;
    }

    async fn check_one(&self, machine: &Machine) {
        let id = machine.id();
        match self.prober.probe(machine).await {
            Ok(latency) => {
                machine.set_last_response_time(latency);
                machine.mark_success(&self.policy);
                metrics::record_probe(id, "healthy");
            }
            Err(e) => {
                tracing::warn!(machine = %id, error = %e, "Health check failed");
                machine.mark_failure(&self.policy);
                metrics::record_probe(id, e.kind());
            }
        }
    }
}
