//! Backend registry: the single source of truth consulted by selection.
//!
//! # Responsibilities
//! - Hold one record per configured backend for the process lifetime
//! - Apply telemetry updates and staleness sweeps (writers)
//! - Hand out point-in-time snapshots to connection tasks (readers)
//!
//! # Design Decisions
//! - Copy-on-write: writers clone the record vector, modify it and swap it in
//!   through `ArcSwap`; readers only bump a reference count
//! - Writers (ingest, sweep) serialize on a mutex that readers never touch
//! - Records are never added or removed after construction

use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::load_balancer::backend::{BackendId, BackendRecord, BackendSet, HealthState, TelemetrySample};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("backend {0} is not configured")]
    UnknownBackend(String),
}

/// A health change produced by an update or sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTransition {
    pub backend: BackendId,
    pub from: HealthState,
    pub to: HealthState,
}

/// Immutable point-in-time view of every record, in configured order.
#[derive(Debug, Clone)]
pub struct Snapshot(Arc<Vec<BackendRecord>>);

impl Snapshot {
    pub fn get(&self, id: &BackendId) -> Option<&BackendRecord> {
        self.0.iter().find(|r| &r.id == id)
    }

    /// Records that are not in `excluded`, order preserved.
    pub fn without(&self, excluded: &[BackendId]) -> Vec<BackendRecord> {
        self.0
            .iter()
            .filter(|r| !excluded.contains(&r.id))
            .cloned()
            .collect()
    }
}

impl Deref for Snapshot {
    type Target = [BackendRecord];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub struct BackendRegistry {
    backends: Arc<BackendSet>,
    records: ArcSwap<Vec<BackendRecord>>,
    writer: Mutex<()>,
}

impl BackendRegistry {
    /// Create a registry whose records all start Unknown at `Instant::now()`.
    pub fn new(backends: Arc<BackendSet>) -> Self {
        Self::starting_at(backends, Instant::now())
    }

    /// Create a registry with an explicit creation time (records age from it).
    pub fn starting_at(backends: Arc<BackendSet>, created_at: Instant) -> Self {
        let records = backends
            .iter()
            .map(|id| BackendRecord::new(id.clone(), created_at))
            .collect();
        Self {
            backends,
            records: ArcSwap::from_pointee(records),
            writer: Mutex::new(()),
        }
    }

    pub fn backends(&self) -> &Arc<BackendSet> {
        &self.backends
    }

    /// Consistent view of all records. Never blocks on writers.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.records.load_full())
    }

    /// Record a fresh sample received now.
    pub fn upsert(&self, id: &BackendId, sample: TelemetrySample) -> Result<Option<HealthTransition>, RegistryError> {
        self.upsert_at(id, sample, Instant::now())
    }

    /// Record a fresh sample received at `now`.
    ///
    /// Returns the health transition if the state changed.
    pub fn upsert_at(
        &self,
        id: &BackendId,
        sample: TelemetrySample,
        now: Instant,
    ) -> Result<Option<HealthTransition>, RegistryError> {
        let position = self
            .backends
            .position(id)
            .ok_or_else(|| RegistryError::UnknownBackend(id.to_string()))?;

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = Vec::clone(&self.records.load());
        let record = &mut records[position];

        let from = record.health;
        record.last_sample = Some(sample);
        record.last_seen_at = now;
        record.health = from.on_sample();
        let to = record.health;

        self.records.store(Arc::new(records));

        Ok((from != to).then(|| HealthTransition {
            backend: id.clone(),
            from,
            to,
        }))
    }

    /// Age every record against the thresholds as of `now`.
    ///
    /// A record past both thresholds reports two transitions, through Stale
    /// into Unreachable. Only swaps in a new vector when a record changed state.
    pub fn sweep_stale(&self, staleness: Duration, unreachable: Duration, now: Instant) -> Vec<HealthTransition> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.records.load_full();

        let mut transitions = Vec::new();
        let mut updated: Option<Vec<BackendRecord>> = None;

        for (position, record) in current.iter().enumerate() {
            let age = now.saturating_duration_since(record.last_seen_at);
            let mut state = record.health;
            loop {
                let next = state.on_age(age, staleness, unreachable);
                if next == state {
                    break;
                }
                transitions.push(HealthTransition {
                    backend: record.id.clone(),
                    from: state,
                    to: next,
                });
                state = next;
            }
            if state == record.health {
                continue;
            }

            let records = updated.get_or_insert_with(|| Vec::clone(&current));
            records[position].health = state;
        }

        if let Some(records) = updated {
            self.records.store(Arc::new(records));
        }
        transitions
    }
}
