//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Telemetry sample accepted (telemetry::ingest):
//!     → registry upsert → Healthy
//!
//! Staleness sweep (sweep.rs):
//!     Periodic timer
//!     → Age each record by time since its last sample
//!     → Healthy → Stale → Unreachable
//!
//! State machine (state.rs):
//!     Unknown/Healthy/Stale/Unreachable with threshold-driven transitions
//! ```
//!
//! # Design Decisions
//! - Health is derived only from telemetry freshness, not from probing
//! - The backend set is static: records are never removed, only aged
//! - Health state is per-backend and lives in the registry

pub mod state;
pub mod sweep;

pub use state::HealthState;
pub use sweep::StalenessSweeper;
