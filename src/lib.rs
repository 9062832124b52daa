//! Telemetry-aware TCP load balancer for DASH segment servers.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client TCP
//!       │
//!       ▼
//!  ┌──────────┐    ┌───────────────┐  pick(snapshot)  ┌────────────────┐
//!  │   net    │───▶│ proxy session │─────────────────▶│ load_balancer  │
//!  │ listener │    │ select → dial │                  │   strategy     │
//!  └──────────┘    │  → relay      │                  └───────┬────────┘
//!                  └──────┬────────┘                          │ snapshot
//!                         │ bytes                     ┌───────┴────────┐
//!                         ▼                           │    registry    │
//!                      Backend                        └───▲────────▲───┘
//!                                                  upsert │        │ age
//!  MQTT broker ──▶ telemetry (broker → ingest → codec) ───┘  health::sweep
//!
//!  Cross-cutting: config · lifecycle · observability · resilience · admin
//! ```

// Core subsystems
pub mod config;
pub mod net;
pub mod proxy;
pub mod telemetry;

// Traffic management
pub mod health;
pub mod load_balancer;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::BalancerConfig;
pub use lifecycle::Shutdown;
pub use proxy::BalancerServer;
