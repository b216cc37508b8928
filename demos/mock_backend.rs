//! A pretend machine to put behind the balancer.
//!
//! ```text
//! PORT=3001 cargo run --example mock_backend
//! PORT=3002 cargo run --example mock_backend
//! cargo run -- --config balancer.toml
//! ```
//!
//! `GET /` answers after a random 0-2000 ms delay; `GET /health` answers at once.

use axum::{extract::State, http::Uri, middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct Backend {
    port: u16,
    requests: Arc<AtomicU64>,
}

#[tokio::main]
async fn main() {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);
    let backend = Backend {
        port,
        requests: Arc::new(AtomicU64::new(0)),
    };

    let app = Router::new()
        .route("/", get(hello))
        .route("/health", get(|| async { "OK" }))
        .layer(middleware::from_fn_with_state(backend.clone(), count_requests))
        .with_state(backend);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("Test server is listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn hello(State(backend): State<Backend>) -> String {
    tokio::time::sleep(Duration::from_millis(fastrand::u64(0..2000))).await;
    format!("Hello from the test server! {}", backend.port)
}

async fn count_requests(
    State(backend): State<Backend>,
    uri: Uri,
    request: axum::extract::Request,
    next: middleware::Next,
) -> axum::response::Response {
    if uri.path() != "/health" {
        let n = backend.requests.fetch_add(1, Ordering::Relaxed) + 1;
        println!("Request received at {} on port {} (#{})", uri, backend.port, n);
    }
    next.run(request).await
}
