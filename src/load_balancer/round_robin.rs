//! Round-robin load balancing strategy.
//!
//! The cursor is a single atomic shared by every connection task. Each call
//! claims one cursor value with `fetch_add`, so N consecutive claims against an
//! unchanged eligible set of size N visit every backend exactly once, whatever
//! order the tasks run in. Under concurrent calls the order in which tasks
//! observe their picks may differ from the claim order, and a change in the
//! eligible set mid-cycle shifts the modulus; selection stays starvation-free
//! but is not perfectly fair in those windows.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::backend::{BackendId, BackendRecord};
use crate::load_balancer::SelectionStrategy;

/// Round-robin selector over non-Unreachable backends.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next record from an already-filtered pool.
    pub(crate) fn next_of<'a>(&self, pool: &[&'a BackendRecord]) -> Option<&'a BackendRecord> {
        if pool.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
        Some(pool[index])
    }
}

impl SelectionStrategy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn pick(&self, snapshot: &[BackendRecord]) -> Option<BackendId> {
        let eligible: Vec<&BackendRecord> = snapshot.iter().filter(|r| r.is_eligible()).collect();
        self.next_of(&eligible).map(|r| r.id.clone())
    }
}
