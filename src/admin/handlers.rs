use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::BalancerError;
use crate::http::server::AppState;
use crate::load_balancer::{Deregistration, MachineSnapshot, Registration};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub machines: usize,
    pub eligible: usize,
}

/// `POST /register`
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Response {
    let Json(registration) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return BalancerError::InvalidInput(rejection.body_text()).into_response(),
    };

    match state.registry.register(registration, state.prober.as_ref()).await {
        Ok(_) => (StatusCode::CREATED, "Machine registered successfully").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Registration rejected");
            e.into_response()
        }
    }
}

/// `POST /deregister`
pub async fn deregister(
    State(state): State<AppState>,
    payload: Result<Json<Deregistration>, JsonRejection>,
) -> Response {
    let Json(deregistration) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return BalancerError::InvalidInput(rejection.body_text()).into_response(),
    };

    let result = deregistration
        .validate()
        .and_then(|id| state.registry.deregister(&id));
    match result {
        Ok(_) => (StatusCode::OK, "Machine deregistered successfully").into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /admin/status`
pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        machines: state.registry.len(),
        eligible: state.registry.list_eligible().count(),
    })
}

/// `GET /admin/machines`
pub async fn get_machines(State(state): State<AppState>) -> Json<Vec<MachineSnapshot>> {
    Json(state.registry.snapshot())
}
