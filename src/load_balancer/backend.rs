//! Backend identity, telemetry samples and per-backend records.
//!
//! # Responsibilities
//! - Represent a configured backend (`host:port`)
//! - Hold the latest telemetry sample reported for it
//! - Carry the backend's health state as seen by the registry

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use serde::Serialize;

pub use crate::health::state::HealthState;

/// Opaque identity of a configured backend (its `host:port` string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(Arc<str>);

impl BackendId {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(Arc::from(address.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for BackendId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// The static, ordered set of backends taken from configuration.
///
/// Order matters: it is the cycle order for round-robin and the tie-break
/// order for least-loaded selection.
#[derive(Debug, Clone)]
pub struct BackendSet {
    ordered: Vec<BackendId>,
    index: HashMap<BackendId, usize>,
}

impl BackendSet {
    /// Build the set, dropping duplicate addresses (first occurrence wins).
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut index = HashMap::new();
        for address in addresses {
            let id = BackendId::new(address.as_ref().trim());
            if index.contains_key(&id) {
                tracing::warn!(backend = %id, "Duplicate backend ignored");
                continue;
            }
            index.insert(id.clone(), ordered.len());
            ordered.push(id);
        }
        Self { ordered, index }
    }

    /// Resolve a wire string to the configured identity, if any.
    pub fn lookup(&self, address: &str) -> Option<&BackendId> {
        self.index
            .get_key_value(address)
            .map(|(id, _)| id)
    }

    /// Configured position of a backend.
    pub fn position(&self, id: &BackendId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendId> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

impl std::borrow::Borrow<str> for BackendId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A decoded, range-checked telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    /// Memory pressure in `[0, 1]`.
    pub memory: f64,
    /// Disk read pressure in `[0, 1]`.
    pub disk_read: f64,
    /// Requests in flight on the backend when sampled.
    pub active_requests: u64,
    /// Publisher wall-clock time of the sample.
    pub observed_at: SystemTime,
}

/// Latest known state of one backend.
#[derive(Debug, Clone)]
pub struct BackendRecord {
    pub id: BackendId,
    pub last_sample: Option<TelemetrySample>,
    /// Local receive time of the last sample (registry creation time until one arrives).
    pub last_seen_at: Instant,
    pub health: HealthState,
}

impl BackendRecord {
    pub fn new(id: BackendId, created_at: Instant) -> Self {
        Self {
            id,
            last_sample: None,
            last_seen_at: created_at,
            health: HealthState::Unknown,
        }
    }

    /// Whether selection may route to this backend at all.
    pub fn is_eligible(&self) -> bool {
        self.health != HealthState::Unreachable
    }

    /// Fresh telemetry is available for load-based decisions.
    pub fn has_fresh_sample(&self) -> bool {
        self.health == HealthState::Healthy && self.last_sample.is_some()
    }
}
