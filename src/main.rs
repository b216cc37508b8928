//! Machine balancer
//!
//! Forwards every inbound HTTP request to the least-loaded healthy machine in
//! a pool that machines join and leave at runtime.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ dispatch ──▶ load_balancer::LeastLoad ──▶ Machine
//!                    │                │                                      ▲
//!                    │                └── resilience (timeout/retry/cb) ─────┤
//!                    ▼                                                       │
//!        /register, /deregister ──▶ load_balancer::registry ◀── health::active
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use machine_balancer::config::load_config;
use machine_balancer::lifecycle::Shutdown;
use machine_balancer::observability::{logging, metrics};
use machine_balancer::HttpServer;

#[derive(Parser)]
#[command(name = "machine-balancer")]
#[command(about = "Least-load HTTP balancer for a dynamic machine pool", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "machine-balancer starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_ms = config.resilience.request_timeout_ms,
        retry_attempts = config.resilience.retry_attempts,
        breaker_threshold = config.circuit_breaker.threshold,
        health_check_interval_ms = config.health_check.interval_ms,
        seed_machines = config.machines.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let server_shutdown = shutdown.subscribe();

    shutdown.trigger_on_signal();

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
