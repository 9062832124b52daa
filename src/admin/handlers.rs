use std::time::Instant;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::health::state::HealthState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub strategy: String,
    pub active_sessions: u64,
    pub backends: HealthCounts,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCounts {
    pub unknown: usize,
    pub healthy: usize,
    pub stale: usize,
    pub unreachable: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SampleView {
    pub memory: f64,
    pub disk_read: f64,
    pub active_requests: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendStatus {
    pub address: String,
    pub health: String,
    pub last_sample: Option<SampleView>,
    pub seconds_since_seen: f64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.registry.snapshot();
    let mut counts = HealthCounts::default();
    for record in snapshot.iter() {
        match record.health {
            HealthState::Unknown => counts.unknown += 1,
            HealthState::Healthy => counts.healthy += 1,
            HealthState::Stale => counts.stale += 1,
            HealthState::Unreachable => counts.unreachable += 1,
        }
    }

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        strategy: state.strategy.name().to_string(),
        active_sessions: state.tracker.active_count(),
        backends: counts,
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let now = Instant::now();
    let statuses = state
        .registry
        .snapshot()
        .iter()
        .map(|record| BackendStatus {
            address: record.id.to_string(),
            health: record.health.as_str().to_string(),
            last_sample: record.last_sample.map(|s| SampleView {
                memory: s.memory,
                disk_read: s.disk_read,
                active_requests: s.active_requests,
            }),
            seconds_since_seen: now.saturating_duration_since(record.last_seen_at).as_secs_f64(),
        })
        .collect();

    Json(statuses)
}
