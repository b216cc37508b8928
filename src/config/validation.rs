//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! All errors are collected, not just the first one.

use std::net::SocketAddr;
use crate::config::schema::BalancerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a deserialized configuration.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if config.resilience.request_timeout_ms == 0 {
        errors.push(ValidationError::new("resilience.request_timeout_ms", "must be greater than 0"));
    }
    if config.resilience.retry_attempts == 0 {
        errors.push(ValidationError::new("resilience.retry_attempts", "must be at least 1"));
    }
    if !config.health_check.enabled && config.circuit_breaker.threshold > 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.threshold",
            "must be 0 when health checks are disabled; an open breaker only recovers through health checks",
        ));
    }
    if config.health_check.enabled && config.health_check.interval_ms == 0 {
        errors.push(ValidationError::new("health_check.interval_ms", "must be greater than 0"));
    }
    if !config.health_check.path.starts_with('/') {
        errors.push(ValidationError::new("health_check.path", "must start with '/'"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }

    for (i, machine) in config.machines.iter().enumerate() {
        let field = format!("machines[{}]", i);
        if machine.host.trim().is_empty() {
            errors.push(ValidationError::new(&field, "host must not be empty"));
        }
        if machine.port == 0 {
            errors.push(ValidationError::new(&field, "port must be greater than 0"));
        }
        if machine.max_connections == 0 {
            errors.push(ValidationError::new(&field, "max_connections must be greater than 0"));
        }
        let duplicate = config.machines[..i]
            .iter()
            .any(|m| m.host == machine.host && m.port == machine.port);
        if duplicate {
            errors.push(ValidationError::new(&field, "duplicate host and port"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{}' is not a socket address", value)));
    }
}
