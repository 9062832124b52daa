//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Ordered backend identities (`host:port`).
    pub backends: Vec<String>,

    /// Telemetry subscription and staleness settings.
    pub telemetry: TelemetryConfig,

    /// Selection strategy and its weights.
    pub strategy: StrategyConfig,

    /// Backend dial settings.
    pub dial: DialConfig,

    /// Per-session relay and shutdown settings.
    pub session: SessionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Read-only admin API.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent sessions (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Telemetry broker and staleness configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Subscribe to backend telemetry at all.
    pub enabled: bool,

    pub broker_host: String,

    pub broker_port: u16,

    /// Topic the backend agents publish on.
    pub topic: String,

    /// Prefix of the MQTT client id; a random suffix is appended per connection.
    pub client_id_prefix: String,

    pub keep_alive_secs: u64,

    /// Deadline for connect + SUBACK.
    pub handshake_timeout_ms: u64,

    /// Period of the staleness sweep.
    pub sweep_interval_ms: u64,

    /// Age after which a backend's telemetry is stale.
    pub staleness_threshold_ms: u64,

    /// Age after which a backend is unreachable.
    pub unreachable_threshold_ms: u64,

    pub reconnect_base_delay_ms: u64,

    pub reconnect_max_delay_ms: u64,
}

impl TelemetryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }

    pub fn unreachable_threshold(&self) -> Duration {
        Duration::from_millis(self.unreachable_threshold_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            topic: "loadbalancer/metrics".to_string(),
            client_id_prefix: "lb".to_string(),
            keep_alive_secs: 10,
            handshake_timeout_ms: 5_000,
            sweep_interval_ms: 1_000,
            // Agents publish every 10s: three missed samples make a backend stale.
            staleness_threshold_ms: 30_000,
            unreachable_threshold_ms: 60_000,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

/// Which selection strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    LeastLoaded,
    Random,
    WeightedProbability,
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(StrategyKind::RoundRobin),
            "least_loaded" => Ok(StrategyKind::LeastLoaded),
            "random" => Ok(StrategyKind::Random),
            "weighted_probability" => Ok(StrategyKind::WeightedProbability),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// Strategy selection.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StrategyConfig {
    pub kind: StrategyKind,

    /// Weights for the least-loaded score (ignored by the other strategies).
    pub weights: LoadWeights,
}

/// Weights of the least-loaded score.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadWeights {
    pub memory: f64,
    pub disk_read: f64,
    pub requests: f64,

    /// Request count that maps to a full `1.0` request term.
    pub expected_max_requests: u64,
}

impl Default for LoadWeights {
    fn default() -> Self {
        Self {
            memory: 1.0,
            disk_read: 1.0,
            requests: 1.0,
            expected_max_requests: 100,
        }
    }
}

/// Backend dial configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DialConfig {
    /// Connect timeout per attempt in milliseconds.
    pub connect_timeout_ms: u64,

    /// Total dial attempts per session, first attempt included.
    pub max_attempts: u32,
}

impl DialConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2_000,
            max_attempts: 3,
        }
    }
}

/// Session relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity allowed on the surviving direction after the other ends.
    pub drain_timeout_ms: u64,

    /// Time given to in-flight sessions on shutdown before they are closed.
    pub shutdown_grace_secs: u64,
}

impl SessionConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 1_000,
            shutdown_grace_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
