//! Least-loaded strategy driven by backend telemetry.
//!
//! Among Healthy backends with a sample, picks the minimum of
//!
//! ```text
//! score = w_mem * memory + w_disk * disk_read + w_req * min(active_requests / expected_max, 1)
//! ```
//!
//! Ties go to the backend configured first. Backends without fresh telemetry
//! (Unknown, Stale) form a last-resort pool served round-robin only when no
//! sampled backend is eligible. Unreachable backends are never picked.

use crate::config::schema::LoadWeights;
use crate::load_balancer::backend::{BackendId, BackendRecord, TelemetrySample};
use crate::load_balancer::round_robin::RoundRobin;
use crate::load_balancer::SelectionStrategy;

#[derive(Debug)]
pub struct LeastLoaded {
    weights: LoadWeights,
    fallback: RoundRobin,
}

impl LeastLoaded {
    pub fn new(weights: LoadWeights) -> Self {
        Self {
            weights,
            fallback: RoundRobin::new(),
        }
    }

    /// Scalar load score of a sample; lower is better.
    pub fn score(&self, sample: &TelemetrySample) -> f64 {
        let w = &self.weights;
        let requests = if w.expected_max_requests > 0 {
            (sample.active_requests as f64 / w.expected_max_requests as f64).min(1.0)
        } else {
            0.0
        };
        w.memory * sample.memory + w.disk_read * sample.disk_read + w.requests * requests
    }
}

impl SelectionStrategy for LeastLoaded {
    fn name(&self) -> &'static str {
        "least_loaded"
    }

    fn pick(&self, snapshot: &[BackendRecord]) -> Option<BackendId> {
        let mut best: Option<(&BackendRecord, f64)> = None;
        for record in snapshot.iter().filter(|r| r.has_fresh_sample()) {
            let Some(sample) = record.last_sample.as_ref() else {
                continue;
            };
            let score = self.score(sample);
            // Strict comparison keeps the earlier-configured backend on ties.
            if best.map_or(true, |(_, lowest)| score < lowest) {
                best = Some((record, score));
            }
        }

        if let Some((record, score)) = best {
            tracing::trace!(backend = %record.id, score, "Least-loaded pick");
            return Some(record.id.clone());
        }

        let last_resort: Vec<&BackendRecord> = snapshot
            .iter()
            .filter(|r| r.is_eligible() && !r.has_fresh_sample())
            .collect();
        self.fallback.next_of(&last_resort).map(|r| r.id.clone())
    }
}
