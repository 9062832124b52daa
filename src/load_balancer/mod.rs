//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Telemetry ingest / staleness sweep
//!     → registry.rs (copy-on-write records, one per configured backend)
//!     → snapshot handed to the session
//!     → Apply selection strategy:
//!         - round_robin.rs (rotate through eligible backends)
//!         - least_loaded.rs (lowest weighted telemetry score)
//!         - random.rs (uniform over eligible backends)
//!         - weighted.rs (random draw weighted by telemetry-derived probability)
//!     → Return backend identity or None
//! ```
//!
//! # Design Decisions
//! - Strategies never block and never perform I/O; they only see the snapshot
//! - The active strategy is a runtime choice, dispatched through `dyn SelectionStrategy`
//! - Unreachable backends are excluded by every strategy

pub mod backend;
pub mod least_loaded;
pub mod random;
pub mod registry;
pub mod round_robin;
pub mod weighted;

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::schema::{StrategyConfig, StrategyKind};
use crate::load_balancer::backend::{BackendId, BackendRecord};

pub use least_loaded::LeastLoaded;
pub use registry::{BackendRegistry, Snapshot};
pub use random::RandomPick;
pub use round_robin::RoundRobin;
pub use weighted::WeightedProbability;

/// Policy that picks one backend for a new connection.
pub trait SelectionStrategy: Send + Sync + Debug {
    /// Strategy name for logs and the admin API.
    fn name(&self) -> &'static str;

    /// Pick a backend from `snapshot`, or `None` if nothing is eligible.
    fn pick(&self, snapshot: &[BackendRecord]) -> Option<BackendId>;
}

/// Build the configured strategy.
pub fn build_strategy(config: &StrategyConfig) -> Arc<dyn SelectionStrategy> {
    match config.kind {
        StrategyKind::RoundRobin => Arc::new(RoundRobin::new()),
        StrategyKind::LeastLoaded => Arc::new(LeastLoaded::new(config.weights.clone())),
        StrategyKind::Random => Arc::new(RandomPick::new()),
        StrategyKind::WeightedProbability => Arc::new(WeightedProbability::new()),
    }
}
