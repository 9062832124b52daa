//! Periodic staleness sweep.
//!
//! # Responsibilities
//! - Age every backend record on a fixed period
//! - Log health transitions and publish the health gauge
//!
//! Runs independently of telemetry ingest, so backends keep aging toward
//! Stale/Unreachable while the broker is down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{self, MissedTickBehavior};

use crate::config::TelemetryConfig;
use crate::health::state::HealthState;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::registry::{BackendRegistry, HealthTransition};
use crate::observability::metrics;

pub struct StalenessSweeper {
    registry: Arc<BackendRegistry>,
    interval: Duration,
    staleness: Duration,
    unreachable: Duration,
}

impl StalenessSweeper {
    pub fn new(registry: Arc<BackendRegistry>, config: &TelemetryConfig) -> Self {
        Self {
            registry,
            interval: config.sweep_interval(),
            staleness: config.staleness_threshold(),
            unreachable: config.unreachable_threshold(),
        }
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            staleness_ms = self.staleness.as_millis() as u64,
            unreachable_ms = self.unreachable.as_millis() as u64,
            "Staleness sweep starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once(Instant::now());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Staleness sweep received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one sweep as of `now` and report what changed.
    pub fn sweep_once(&self, now: Instant) -> Vec<HealthTransition> {
        let transitions = self.registry.sweep_stale(self.staleness, self.unreachable, now);
        for t in &transitions {
            log_transition(t);
            metrics::record_backend_health(t.backend.as_str(), t.to);
        }
        transitions
    }
}

/// Log a health change at a level matching its severity.
pub fn log_transition(t: &HealthTransition) {
    match t.to {
        HealthState::Unreachable => {
            tracing::warn!(backend = %t.backend, from = %t.from, "Backend unreachable: no telemetry");
        }
        HealthState::Stale => {
            tracing::warn!(backend = %t.backend, from = %t.from, "Backend telemetry stale");
        }
        _ => {
            tracing::info!(backend = %t.backend, from = %t.from, to = %t.to, "Backend health changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::load_balancer::backend::BackendSet;

    fn config() -> TelemetryConfig {
        TelemetryConfig {
            sweep_interval_ms: 10,
            staleness_threshold_ms: 30,
            unreachable_threshold_ms: 60,
            ..TelemetryConfig::default()
        }
    }

    #[test]
    fn sweep_once_reports_transitions() {
        let start = Instant::now();
        let registry = Arc::new(BackendRegistry::starting_at(Arc::new(BackendSet::new(["a:1"])), start));
        let sweeper = StalenessSweeper::new(registry.clone(), &config());

        assert!(sweeper.sweep_once(start).is_empty());
        let t = sweeper.sweep_once(start + Duration::from_millis(100));
        let hops: Vec<_> = t.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            hops,
            vec![(HealthState::Unknown, HealthState::Stale), (HealthState::Stale, HealthState::Unreachable)]
        );
    }

    #[tokio::test]
    async fn background_sweep_marks_silent_backend_unreachable() {
        let registry = Arc::new(BackendRegistry::new(Arc::new(BackendSet::new(["a:1", "b:2"]))));
        let shutdown = Shutdown::new();
        let task = tokio::spawn(StalenessSweeper::new(registry.clone(), &config()).run(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.snapshot().iter().all(|r| r.health == HealthState::Unreachable));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
