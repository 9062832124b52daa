//! Uniform random selection over eligible backends.

use rand::Rng;

use crate::load_balancer::backend::{BackendId, BackendRecord};
use crate::load_balancer::SelectionStrategy;

#[derive(Debug, Default)]
pub struct RandomPick;

impl RandomPick {
    pub fn new() -> Self {
        Self
    }

    /// Pick one record from an already-filtered pool.
    pub(crate) fn one_of<'a, R: Rng + ?Sized>(pool: &[&'a BackendRecord], rng: &mut R) -> Option<&'a BackendRecord> {
        if pool.is_empty() {
            return None;
        }
        Some(pool[rng.gen_range(0..pool.len())])
    }
}

impl SelectionStrategy for RandomPick {
    fn name(&self) -> &'static str {
        "random"
    }

    fn pick(&self, snapshot: &[BackendRecord]) -> Option<BackendId> {
        let eligible: Vec<&BackendRecord> = snapshot.iter().filter(|r| r.is_eligible()).collect();
        Self::one_of(&eligible, &mut rand::thread_rng()).map(|r| r.id.clone())
    }
}
