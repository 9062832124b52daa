//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_sessions_total` (counter): finished sessions by outcome
//! - `lb_session_duration_seconds` (histogram): session lifetime
//! - `lb_active_sessions` (gauge): sessions in flight
//! - `lb_selections_total` (counter): strategy picks per backend
//! - `lb_dial_failures_total` (counter): failed dials per backend and reason
//! - `lb_relay_bytes_total` (counter): bytes relayed per backend and direction
//! - `lb_telemetry_messages_total` (counter): telemetry messages by result
//! - `lb_broker_reconnects_total` (counter): telemetry resubscriptions
//! - `lb_backend_health` (gauge): 0=unknown, 1=healthy, 2=stale, 3=unreachable
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::state::HealthState;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session(outcome: &'static str, started: Instant) {
    counter!("lb_sessions_total", "outcome" => outcome).increment(1);
    histogram!("lb_session_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn set_active_sessions(count: u64) {
    gauge!("lb_active_sessions").set(count as f64);
}

pub fn record_selection(backend: &str) {
    counter!("lb_selections_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_dial_failure(backend: &str, reason: &'static str) {
    counter!("lb_dial_failures_total", "backend" => backend.to_string(), "reason" => reason).increment(1);
}

pub fn record_relay_bytes(backend: &str, to_backend: u64, to_client: u64) {
    counter!("lb_relay_bytes_total", "backend" => backend.to_string(), "direction" => "to_backend")
        .increment(to_backend);
    counter!("lb_relay_bytes_total", "backend" => backend.to_string(), "direction" => "to_client")
        .increment(to_client);
}

pub fn record_telemetry(result: &'static str) {
    counter!("lb_telemetry_messages_total", "result" => result).increment(1);
}

pub fn record_broker_reconnect() {
    counter!("lb_broker_reconnects_total").increment(1);
}

pub fn record_backend_health(backend: &str, state: HealthState) {
    gauge!("lb_backend_health", "backend" => backend.to_string()).set(state as u8 as f64);
}
