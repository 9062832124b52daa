//! Telemetry wire codec.
//!
//! Payload published by each backend's metrics agent:
//!
//! ```json
//! {
//!   "server_socket": "mpeg-dash-processor-3:8080",
//!   "memory_current": 0.42,
//!   "disk_read": 0.07,
//!   "active_request_count": 12,
//!   "timestamp_unix": 1735689600
//! }
//! ```
//!
//! The agent is supposed to clamp both normalized fields into `[0, 1]`; the
//! decoder does not rely on that and clamps again.

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::load_balancer::backend::{BackendId, BackendSet, TelemetrySample};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed telemetry payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("telemetry for unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("message on unexpected topic '{0}'")]
    UnexpectedTopic(String),
}

/// JSON shape on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSample {
    pub server_socket: String,
    pub memory_current: f64,
    pub disk_read: f64,
    pub active_request_count: u64,
    pub timestamp_unix: i64,
}

/// Decodes payloads arriving on one topic against the configured backend set.
#[derive(Debug, Clone)]
pub struct TelemetryCodec {
    topic: String,
    backends: Arc<BackendSet>,
}

impl TelemetryCodec {
    pub fn new(topic: impl Into<String>, backends: Arc<BackendSet>) -> Self {
        Self {
            topic: topic.into(),
            backends,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Decode one payload into the backend it describes and a checked sample.
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Result<(BackendId, TelemetrySample), DecodeError> {
        if topic != self.topic {
            return Err(DecodeError::UnexpectedTopic(topic.to_string()));
        }

        let wire: WireSample = serde_json::from_slice(payload)?;

        let id = self
            .backends
            .lookup(wire.server_socket.trim())
            .cloned()
            .ok_or_else(|| DecodeError::UnknownBackend(wire.server_socket.clone()))?;

        let memory = normalized("memory_current", wire.memory_current)?;
        let disk_read = normalized("disk_read", wire.disk_read)?;

        let secs = u64::try_from(wire.timestamp_unix).map_err(|_| DecodeError::InvalidValue {
            field: "timestamp_unix",
            value: wire.timestamp_unix.to_string(),
        })?;

        Ok((
            id,
            TelemetrySample {
                memory,
                disk_read,
                active_requests: wire.active_request_count,
                observed_at: UNIX_EPOCH + Duration::from_secs(secs),
            },
        ))
    }
}

/// Clamp a normalized field into `[0, 1]`; non-finite values are rejected.
fn normalized(field: &'static str, value: f64) -> Result<f64, DecodeError> {
    if !value.is_finite() {
        return Err(DecodeError::InvalidValue {
            field,
            value: value.to_string(),
        });
    }
    Ok(value.clamp(0.0, 1.0))
}

/// Encode a sample the way a backend agent publishes it.
pub fn encode_sample(id: &BackendId, sample: &TelemetrySample) -> Vec<u8> {
    let timestamp_unix = sample
        .observed_at
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let wire = WireSample {
        server_socket: id.to_string(),
        memory_current: sample.memory,
        disk_read: sample.disk_read,
        active_request_count: sample.active_requests,
        timestamp_unix,
    };
    // A struct of plain numbers and a string always serializes.
    serde_json::to_vec(&wire).unwrap_or_default()
}
