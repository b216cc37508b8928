//! Errors surfaced to callers of the registry and the dispatcher.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::load_balancer::machine::MachineId;

/// Body text for a 503 when nothing was eligible.
pub const NO_MACHINES_AVAILABLE: &str = "Service Unavailable - No machines available";
/// Body text for a 503 after every attempt and failover failed.
pub const FAILED_AFTER_RETRIES: &str = "Service Unavailable - Request failed after retries";

#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("machine {0} already registered")]
    DuplicateMachine(MachineId),

    #[error("machine {0} not found")]
    NotFound(MachineId),

    #[error("machine {id} unreachable: {reason}")]
    UnreachableMachine { id: MachineId, reason: String },

    #[error("no machines available")]
    NoMachineAvailable,

    #[error("request failed after {attempts} attempts")]
    DispatchFailed { attempts: u32 },
}

impl BalancerError {
    pub fn status(&self) -> StatusCode {
        match self {
            BalancerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BalancerError::DuplicateMachine(_) => StatusCode::CONFLICT,
            BalancerError::NotFound(_) => StatusCode::NOT_FOUND,
            BalancerError::UnreachableMachine { .. } => StatusCode::BAD_GATEWAY,
            BalancerError::NoMachineAvailable | BalancerError::DispatchFailed { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Plain-text body returned to the HTTP caller.
    pub fn body(&self) -> String {
        match self {
            BalancerError::InvalidInput(msg) => format!("Invalid input: {}", msg),
            BalancerError::DuplicateMachine(_) => "Machine already registered".to_string(),
            BalancerError::NotFound(_) => "Machine not found".to_string(),
            BalancerError::UnreachableMachine { id, reason } => {
                format!("Machine {} is unreachable: {}", id, reason)
            }
            BalancerError::NoMachineAvailable => NO_MACHINES_AVAILABLE.to_string(),
            BalancerError::DispatchFailed { .. } => FAILED_AFTER_RETRIES.to_string(),
        }
    }
}

impl IntoResponse for BalancerError {
    fn into_response(self) -> Response {
        (self.status(), self.body()).into_response()
    }
}
