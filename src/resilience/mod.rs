//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to machine:
//!     → timeouts.rs (bound every attempt by REQUEST_TIMEOUT)
//!     → On failure: retries.rs (retry with linear backoff, backoff.rs)
//!     → circuit_breaker.rs (track consecutive failures, open at threshold)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - One attempt budget covers same-machine retries and failovers
//! - Circuit breaker isolates a machine without removing it from the registry

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerPolicy, CircuitBreaker, CircuitState, MachineStatus, Transition};
pub use retries::RetryPolicy;
