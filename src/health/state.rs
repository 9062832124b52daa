//! Backend health state machine.
//!
//! # States
//! - Unknown: configured, no telemetry seen yet
//! - Healthy: fresh telemetry within the staleness window
//! - Stale: telemetry older than the staleness threshold
//! - Unreachable: telemetry older than the unreachable threshold, excluded from selection
//!
//! # State Transitions
//! ```text
//! Unknown → Healthy:      first sample
//! Healthy → Stale:        age > staleness_threshold
//! Stale → Healthy:        fresh sample
//! Stale → Unreachable:    age > unreachable_threshold
//! Unreachable → Healthy:  fresh sample (never without one)
//! Unknown → Stale → Unreachable: a backend that never reports ages from startup
//! ```

use std::time::Duration;

use serde::Serialize;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Stale = 2,
    Unreachable = 3,
}

impl HealthState {
    /// State after a fresh sample arrives. Every state goes to Healthy.
    pub fn on_sample(self) -> HealthState {
        HealthState::Healthy
    }

    /// One aging step for telemetry of the given age.
    ///
    /// Moves at most one edge (Unknown/Healthy → Stale, Stale → Unreachable);
    /// callers that may be past both thresholds apply it until it settles.
    pub fn on_age(self, age: Duration, staleness: Duration, unreachable: Duration) -> HealthState {
        match self {
            HealthState::Unknown | HealthState::Healthy if age > staleness => HealthState::Stale,
            HealthState::Stale if age > unreachable => HealthState::Unreachable,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Stale => "stale",
            HealthState::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
