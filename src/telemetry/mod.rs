//! Telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! Backend metrics agent
//!     → broker topic (MQTT in production, in-process for tests)
//!     → broker.rs (subscribe / recv capability)
//!     → ingest.rs (reconnecting consume loop)
//!     → codec.rs (JSON → checked TelemetrySample)
//!     → BackendRegistry::upsert
//! ```

pub mod broker;
pub mod codec;
pub mod ingest;
pub mod memory;
pub mod mqtt;

pub use broker::{Broker, BrokerError, BrokerMessage, Subscription};
pub use codec::{encode_sample, DecodeError, TelemetryCodec};
pub use ingest::TelemetryIngest;
pub use memory::MemoryBroker;
pub use mqtt::MqttBroker;
