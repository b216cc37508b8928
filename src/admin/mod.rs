//! Administrative surface.
//!
//! Registration endpoints live on the main listener; everything else they do
//! not match falls through to the proxy. The read-only status routes are
//! served on a separate admin listener when enabled.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use crate::http::server::{AppState, proxy_handler};
use self::handlers::*;

/// `/register` and `/deregister`. Other methods on these paths are proxied.
pub fn registration_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register).fallback(proxy_handler))
        .route("/deregister", post(deregister).fallback(proxy_handler))
}

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/machines", get(get_machines))
        .with_state(state)
}
