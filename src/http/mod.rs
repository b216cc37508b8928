//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID and trace layers)
//!     → /register, /deregister handled by the admin handlers
//!     → everything else: proxy_handler → dispatch (select, forward, retry)
//!     → machine response streamed back verbatim
//! ```

pub mod client;
pub mod request;
pub mod server;

pub use client::{build_client, HttpClient};
pub use request::{request_id, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
