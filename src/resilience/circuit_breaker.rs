//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, machine eligible
//! - Open: machine assumed down, excluded from selection
//! - Half-Open: recovery seen after the reset timeout, awaiting confirmation
//!
//! # State Transitions
//! ```text
//! Closed    → Open:      failure_count >= threshold
//! Open      → Half-Open: success, and reset_timeout elapsed since last failure
//! Half-Open → Closed:    success
//! Half-Open → Open:      failure_count >= threshold
//! ```
//!
//! # Design Decisions
//! - Per-machine breaker, owned by the machine record
//! - Driven only by health and dispatch signals; no timer of its own
//! - Callers pass `now` so transitions are deterministic under test

use std::time::{Duration, Instant};
use serde::Serialize;

use crate::config::CircuitBreakerConfig;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric form for the circuit state gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Registry-level status of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Active,
    Inactive,
}

/// Thresholds the breaker is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    /// `0` never opens.
    pub threshold: u32,
    pub reset_timeout: Duration,
}

impl From<&CircuitBreakerConfig> for BreakerPolicy {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            threshold: config.threshold,
            reset_timeout: config.reset_timeout(),
        }
    }
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

/// A state change produced by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    status: MachineStatus,
    failure_count: u32,
    last_failure: Option<Instant>,
    /// Most recent failure observed while open. Unlike `last_failure` it
    /// survives a success, so dwell time can still be measured afterwards.
    open_since: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            status: MachineStatus::Active,
            failure_count: 0,
            last_failure: None,
            open_since: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Active and not open.
    pub fn is_eligible(&self) -> bool {
        self.status == MachineStatus::Active && self.state != CircuitState::Open
    }

    /// Record a failed probe or request.
    pub fn on_failure(&mut self, policy: &BreakerPolicy, now: Instant) -> Option<Transition> {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(now);

        let from = self.state;
        match from {
            CircuitState::Open => {
                self.open_since = Some(now);
                None
            }
            _ if policy.threshold > 0 && self.failure_count >= policy.threshold => {
                self.state = CircuitState::Open;
                self.status = MachineStatus::Inactive;
                self.open_since = Some(now);
                Some(Transition { from, to: CircuitState::Open })
            }
            _ => None,
        }
    }

    /// Record a successful probe or request.
    pub fn on_success(&mut self, policy: &BreakerPolicy, now: Instant) -> Option<Transition> {
        self.failure_count = 0;
        self.last_failure = None;

        match self.state {
            CircuitState::Closed => None,
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.status = MachineStatus::Active;
                Some(Transition { from: CircuitState::HalfOpen, to: CircuitState::Closed })
            }
            CircuitState::Open => {
                let dwelled = self
                    .open_since
                    .map(|since| now.saturating_duration_since(since) >= policy.reset_timeout)
                    .unwrap_or(true);
                if !dwelled {
                    return None;
                }
                self.state = CircuitState::HalfOpen;
                self.open_since = None;
                Some(Transition { from: CircuitState::Open, to: CircuitState::HalfOpen })
            }
        }
    }
}
