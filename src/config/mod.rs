//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: REQUEST_TIMEOUT, RETRY_ATTEMPTS, ...)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//!     → cloned into each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BalancerConfig, CircuitBreakerConfig, HealthCheckConfig, LimitsConfig,
    ListenerConfig, MachineConfig, ObservabilityConfig, RegistrationConfig, ResilienceConfig,
};
