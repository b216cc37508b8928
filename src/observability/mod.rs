//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (machine, attempt, status) on every event
//! - Request ID (`x-request-id`) flows from the client through to the machine
//! - Metrics are cheap and optional

pub mod logging;
pub mod metrics;
