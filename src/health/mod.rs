//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer (HEALTH_CHECK_INTERVAL)
//!     → probe.rs: GET /health on every machine, bounded by REQUEST_TIMEOUT
//!     → Machine::mark_success / mark_failure
//!     → circuit breaker transition (resilience::circuit_breaker)
//!
//! Passive signals come from the dispatcher, which reports every forward
//! attempt to the same breaker.
//! ```
//!
//! # Design Decisions
//! - Probes for different machines run concurrently; one hung machine costs at
//!   most one timeout per tick
//! - Probe failures are never surfaced to clients
//! - The monitor is an explicit task, started and stopped by its owner

pub mod active;
pub mod probe;

pub use active::HealthMonitor;
pub use probe::{ProbeError, Prober};
