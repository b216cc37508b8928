//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router (registration routes + proxy fallback)
//! - Wire up middleware (request ID, tracing, CORS)
//! - Seed the registry from configuration
//! - Start the health monitor and optional admin listener
//! - Serve until the shutdown signal fires

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::BalancerConfig;
use crate::dispatch::{Dispatcher, ProxyRequest};
use crate::health::{HealthMonitor, Prober};
use crate::http::client::build_client;
use crate::http::request::{request_id, UuidRequestId, X_REQUEST_ID};
use crate::load_balancer::{MachineRegistry, Registration};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MachineRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    /// Present when registrations must pass a connectivity probe.
    pub prober: Option<Prober>,
    pub max_body_bytes: usize,
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: BalancerConfig,
    health_prober: Prober,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: BalancerConfig) -> Self {
        let registry = Arc::new(MachineRegistry::new());
        for machine in &config.machines {
            if let Err(e) = registry.add(Registration::from(machine)) {
                tracing::warn!(host = %machine.host, port = machine.port, error = %e, "Skipping seed machine");
            }
        }

        let client = build_client();
        let prober = Prober::with_client(
            client.clone(),
            config.health_check.path.clone(),
            config.resilience.request_timeout(),
        );
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), &config, client));

        let state = AppState {
            registry,
            dispatcher,
            prober: config.registration.verify_connectivity.then(|| prober.clone()),
            max_body_bytes: config.limits.max_body_bytes,
        };

        let router = Self::build_router(state.clone());
        Self {
            router,
            state,
            config,
            health_prober: prober,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        admin::registration_routes()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(cors_layer()),
            )
    }

    /// The registry this server routes over.
    pub fn registry(&self) -> Arc<MachineRegistry> {
        self.state.registry.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            machines = self.state.registry.len(),
            "HTTP server starting"
        );

        let monitor = HealthMonitor::new(
            self.state.registry.clone(),
            self.config.health_check.clone(),
            &self.config.circuit_breaker,
            self.health_prober.clone(),
        );
        let monitor_task = monitor.spawn(shutdown.resubscribe());

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin_router = admin::setup_admin_router(self.state.clone());
            let mut admin_shutdown = shutdown.resubscribe();
            tracing::info!(address = %admin_listener.local_addr()?, "Admin listener starting");
            tokio::spawn(async move {
                let served = axum::serve(admin_listener, admin_router)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin listener failed");
                }
            });
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        if let Err(e) = monitor_task.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Any origin may call the balancer. Preflight requests are answered here and
/// never reach a machine.
fn cors_layer() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_headers([
        header::ORIGIN,
        HeaderName::from_static("x-requested-with"),
        header::CONTENT_TYPE,
        header::ACCEPT,
    ])
}

/// Proxy handler for every request the registration routes do not take.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().clone();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        uri = %request.uri(),
        "Proxying request"
    );

    let response = match ProxyRequest::buffer(request, state.max_body_bytes).await {
        Ok(buffered) => match state.dispatcher.dispatch(&buffered).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Dispatch failed");
                e.into_response()
            }
        },
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejected request body");
            (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}
