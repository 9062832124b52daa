//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            CLI flags / environment
//!     → loader.rs (parse)           → Overrides
//!     → overrides applied on top of the file values
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//!     → shared by value / Arc with all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend set never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_with_overrides, parse_config, ConfigError, Overrides};
pub use schema::BalancerConfig;
pub use schema::DialConfig;
pub use schema::ListenerConfig;
pub use schema::LoadWeights;
pub use schema::SessionConfig;
pub use schema::StrategyConfig;
pub use schema::StrategyKind;
pub use schema::TelemetryConfig;
