//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): proxied requests by method, status
//! - `balancer_request_duration_seconds` (histogram): end-to-end latency
//! - `balancer_dispatch_attempts_total` (counter): forward attempts by machine, outcome
//! - `balancer_failovers_total` (counter): requests moved to another machine
//! - `balancer_health_probes_total` (counter): probes by machine, outcome
//! - `balancer_machine_connections` (gauge): in-flight requests per machine
//! - `balancer_machine_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;
use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::load_balancer::machine::MachineId;
use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    if let Err(e) = builder.install() {
        tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter");
        return;
    }

    describe_counter!("balancer_requests_total", Unit::Count, "Proxied requests");
    describe_histogram!(
        "balancer_request_duration_seconds",
        Unit::Seconds,
        "End-to-end proxied request duration"
    );
    describe_counter!("balancer_dispatch_attempts_total", Unit::Count, "Forward attempts");
    describe_counter!("balancer_failovers_total", Unit::Count, "Failovers to another machine");
    describe_counter!("balancer_health_probes_total", Unit::Count, "Health probes");
    describe_gauge!("balancer_machine_connections", Unit::Count, "In-flight requests per machine");
    describe_gauge!("balancer_machine_circuit_state", "Circuit state per machine");

    tracing::info!(address = %addr, "Metrics exporter listening");
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "balancer_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("balancer_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_attempt(machine: &MachineId, outcome: &'static str) {
    counter!(
        "balancer_dispatch_attempts_total",
        "machine" => machine.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_failover() {
    counter!("balancer_failovers_total").increment(1);
}

pub fn record_probe(machine: &MachineId, outcome: &'static str) {
    counter!(
        "balancer_health_probes_total",
        "machine" => machine.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_machine_connections(machine: &MachineId, connections: usize) {
    gauge!("balancer_machine_connections", "machine" => machine.to_string()).set(connections as f64);
}

pub fn record_circuit_state(machine: &MachineId, state: CircuitState) {
    gauge!("balancer_machine_circuit_state", "machine" => machine.to_string()).set(state.as_gauge());
}
