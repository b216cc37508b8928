//! Configuration loading from disk and environment.

use std::path::Path;
use std::fs;
use crate::config::schema::BalancerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variables recognized as overrides, all in milliseconds except
/// the two counts.
pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
pub const RETRY_ATTEMPTS: &str = "RETRY_ATTEMPTS";
pub const CIRCUIT_BREAKER_THRESHOLD: &str = "CIRCUIT_BREAKER_THRESHOLD";
pub const CIRCUIT_BREAKER_RESET_TIMEOUT: &str = "CIRCUIT_BREAKER_RESET_TIMEOUT";
pub const HEALTH_CHECK_INTERVAL: &str = "HEALTH_CHECK_INTERVAL";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Override { name: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Override { name, value } => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from an optional TOML file, apply environment overrides
/// and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<BalancerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => BalancerConfig::default(),
    };

    apply_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the named overrides using `lookup` to read each value.
pub fn apply_overrides<F>(config: &mut BalancerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = parse_override(&lookup, REQUEST_TIMEOUT)? {
        config.resilience.request_timeout_ms = v;
    }
    if let Some(v) = parse_override(&lookup, RETRY_ATTEMPTS)? {
        config.resilience.retry_attempts = v;
    }
    if let Some(v) = parse_override(&lookup, CIRCUIT_BREAKER_THRESHOLD)? {
        config.circuit_breaker.threshold = v;
    }
    if let Some(v) = parse_override(&lookup, CIRCUIT_BREAKER_RESET_TIMEOUT)? {
        config.circuit_breaker.reset_timeout_ms = v;
    }
    if let Some(v) = parse_override(&lookup, HEALTH_CHECK_INTERVAL)? {
        config.health_check.interval_ms = v;
    }
    Ok(())
}

fn parse_override<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Override { name, value: raw }),
        None => Ok(None),
    }
}
