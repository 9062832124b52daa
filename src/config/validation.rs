//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate backend identities (`host:port`, no duplicates)
//! - Validate value ranges (thresholds ordered, weights usable, timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.backends.is_empty() {
        errors.push(ValidationError::new("backends", "at least one backend is required"));
    }
    let mut seen = HashSet::new();
    for (i, backend) in config.backends.iter().enumerate() {
        let field = format!("backends[{}]", i);
        if let Err(message) = check_host_port(backend) {
            errors.push(ValidationError::new(field.clone(), message));
        }
        if !seen.insert(backend.trim()) {
            errors.push(ValidationError::new(field, format!("duplicate backend '{}'", backend)));
        }
    }

    let telemetry = &config.telemetry;
    if telemetry.topic.trim().is_empty() {
        errors.push(ValidationError::new("telemetry.topic", "must not be empty"));
    }
    if telemetry.sweep_interval_ms == 0 {
        errors.push(ValidationError::new("telemetry.sweep_interval_ms", "must be greater than 0"));
    }
    if telemetry.staleness_threshold_ms == 0 {
        errors.push(ValidationError::new("telemetry.staleness_threshold_ms", "must be greater than 0"));
    }
    if telemetry.unreachable_threshold_ms <= telemetry.staleness_threshold_ms {
        errors.push(ValidationError::new(
            "telemetry.unreachable_threshold_ms",
            "must be greater than staleness_threshold_ms",
        ));
    }
    if telemetry.reconnect_base_delay_ms > telemetry.reconnect_max_delay_ms {
        errors.push(ValidationError::new(
            "telemetry.reconnect_base_delay_ms",
            "must not exceed reconnect_max_delay_ms",
        ));
    }

    let weights = &config.strategy.weights;
    for (name, value) in [
        ("memory", weights.memory),
        ("disk_read", weights.disk_read),
        ("requests", weights.requests),
    ] {
        if !value.is_finite() || value < 0.0 {
            errors.push(ValidationError::new(
                format!("strategy.weights.{}", name),
                "must be a finite, non-negative number",
            ));
        }
    }
    if weights.memory + weights.disk_read + weights.requests <= 0.0 {
        errors.push(ValidationError::new("strategy.weights", "at least one weight must be positive"));
    }
    if weights.expected_max_requests == 0 {
        errors.push(ValidationError::new("strategy.weights.expected_max_requests", "must be greater than 0"));
    }

    if config.dial.max_attempts == 0 {
        errors.push(ValidationError::new("dial.max_attempts", "must be at least 1"));
    }
    if config.dial.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("dial.connect_timeout_ms", "must be greater than 0"));
    }

    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("admin.bind_address", "is not a socket address"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "is not a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_host_port(backend: &str) -> Result<(), String> {
    let Some((host, port)) = backend.trim().rsplit_once(':') else {
        return Err(format!("'{}' is not host:port", backend));
    };
    if host.is_empty() {
        return Err(format!("'{}' has an empty host", backend));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("'{}' has an invalid port", backend)),
        Ok(_) => Ok(()),
    }
}
