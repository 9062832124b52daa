//! Probability-weighted selection driven by backend telemetry.
//!
//! For the `n` Healthy backends with a sample:
//!
//! ```text
//! TM, TD   = mean memory, mean disk_read
//! CM, CD   = TM / (TM + TD), TD / (TM + TD)      (0.5 each when both are 0)
//! Li       = CM * memory_i + CD * disk_read_i
//! Ltot     = sum(Li)
//! T        = mean sample age in seconds
//! arriveT  = R / T / Ltot                         (R = picks made so far)
//! Pi       = ((Ltot + arriveT) / n - Li) / arriveT
//! ```
//!
//! The `Pi` sum to 1. Negative ones are clamped to 0, and a backend is drawn
//! at random in proportion to its `Pi`. When `arriveT` is not a positive finite
//! number, or every `Pi` is 0, the draw is uniform. As `R` grows every `Pi`
//! tends to `1 / n`, so load matters most early on. With no sampled backend the
//! draw falls back to a uniform pick over the other eligible ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use rand::Rng;

use crate::load_balancer::backend::{BackendId, BackendRecord, TelemetrySample};
use crate::load_balancer::random::RandomPick;
use crate::load_balancer::SelectionStrategy;

#[derive(Debug, Default)]
pub struct WeightedProbability {
    arrivals: AtomicU64,
}

impl WeightedProbability {
    pub fn new() -> Self {
        Self::default()
    }

    fn pick_with<R: Rng + ?Sized>(&self, snapshot: &[BackendRecord], now: SystemTime, rng: &mut R) -> Option<BackendId> {
        let arrivals = self.arrivals.fetch_add(1, Ordering::Relaxed) + 1;

        let sampled: Vec<(&BackendRecord, &TelemetrySample)> = snapshot
            .iter()
            .filter(|r| r.has_fresh_sample())
            .filter_map(|r| r.last_sample.as_ref().map(|s| (r, s)))
            .collect();

        if sampled.is_empty() {
            let last_resort: Vec<&BackendRecord> = snapshot.iter().filter(|r| r.is_eligible()).collect();
            return RandomPick::one_of(&last_resort, rng).map(|r| r.id.clone());
        }

        let samples: Vec<&TelemetrySample> = sampled.iter().map(|(_, s)| *s).collect();
        let weights = probabilities(&samples, arrivals, now);
        let index = weighted_index(&weights, rng).unwrap_or_else(|| rng.gen_range(0..sampled.len()));
        let (record, _) = sampled[index];
        tracing::trace!(backend = %record.id, probability = weights[index], "Weighted pick");
        Some(record.id.clone())
    }
}

impl SelectionStrategy for WeightedProbability {
    fn name(&self) -> &'static str {
        "weighted_probability"
    }

    fn pick(&self, snapshot: &[BackendRecord]) -> Option<BackendId> {
        self.pick_with(snapshot, SystemTime::now(), &mut rand::thread_rng())
    }
}

/// Selection probability of each sample, clamped at 0; uniform when degenerate.
pub fn probabilities(samples: &[&TelemetrySample], arrivals: u64, now: SystemTime) -> Vec<f64> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let count = n as f64;
    let uniform = vec![1.0 / count; n];

    let mean_memory = samples.iter().map(|s| s.memory).sum::<f64>() / count;
    let mean_disk = samples.iter().map(|s| s.disk_read).sum::<f64>() / count;
    let denom = mean_memory + mean_disk;
    let (c_m, c_d) = if denom > 0.0 {
        (mean_memory / denom, mean_disk / denom)
    } else {
        (0.5, 0.5)
    };

    let loads: Vec<f64> = samples.iter().map(|s| c_m * s.memory + c_d * s.disk_read).collect();
    let total_load: f64 = loads.iter().sum();
    let mean_age = samples
        .iter()
        .map(|s| now.duration_since(s.observed_at).unwrap_or_default().as_secs_f64())
        .sum::<f64>()
        / count;

    let arrive_t = arrivals as f64 / mean_age / total_load;
    if !arrive_t.is_finite() || arrive_t <= 0.0 {
        return uniform;
    }

    let weights: Vec<f64> = loads
        .iter()
        .map(|l| {
            let p = ((total_load + arrive_t) / count - l) / arrive_t;
            if p.is_finite() {
                p.max(0.0)
            } else {
                0.0
            }
        })
        .collect();

    if weights.iter().sum::<f64>() > 0.0 {
        weights
    } else {
        uniform
    }
}

/// Draw an index in proportion to `weights`, or `None` if they sum to 0.
fn weighted_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if total.is_nan() || total <= 0.0 {
        return None;
    }
    let mut threshold = rng.gen::<f64>() * total;
    let mut last = None;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        if threshold < w {
            return Some(i);
        }
        threshold -= w;
        last = Some(i);
    }
    // Rounding left a sliver past the end.
    last
}
