//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build registry + strategy → Start ingest, sweep, admin → Accept
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting (and ingest/sweep/admin)
//!     → Drain sessions up to the grace period → Force-close the rest → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
