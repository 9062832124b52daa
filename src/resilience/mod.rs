//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backend dial:
//!     → timeouts.rs (enforce connect timeout)
//!     → On failure: proxy::session re-selects excluding the failed backend
//!
//! Broker subscription lost:
//!     → backoff.rs (exponential delay with jitter before resubscribing)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend dial has a deadline
//! - Jittered backoff prevents a reconnect stampede against the broker

pub mod backoff;
pub mod timeouts;

pub use backoff::{calculate_backoff, Backoff};
pub use timeouts::{connect_with_timeout, DialError};
