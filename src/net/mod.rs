//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (session id, lifecycle tracking)
//!     → Hand off to proxy::session
//!
//! Session States:
//!     Accepted → Selecting → Dialing → Forwarding → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each session tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker, SessionState};
pub use listener::{ConnectionPermit, Listener, ListenerError};
