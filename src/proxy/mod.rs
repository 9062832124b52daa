//! Connection forwarder.
//!
//! # Data Flow
//! ```text
//! server.rs accept loop
//!     → session.rs (select → dial → retry on failure)
//!     → relay.rs (client ⇄ backend byte copy until either side ends)
//! ```

pub mod relay;
pub mod server;
pub mod session;

pub use relay::{relay, Direction, RelayError, RelayStats};
pub use server::BalancerServer;
pub use session::{run_session, SessionContext, SessionError, SessionSummary};
