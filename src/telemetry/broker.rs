//! Publish/subscribe capability used to carry telemetry.
//!
//! The ingest only needs to subscribe to one topic and read messages from it;
//! publishing is used by operator tooling and tests. Keeping the surface this
//! small lets the in-process `MemoryBroker` stand in for MQTT.

use std::future::Future;

use thiserror::Error;

/// One message received on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// An established subscription was lost.
    #[error("broker disconnected: {0}")]
    Disconnected(String),

    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("broker handshake timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A telemetry transport.
pub trait Broker: Send + Sync + 'static {
    type Subscription: Subscription;

    /// Open a subscription on `topic`. Each call starts a fresh session.
    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<Self::Subscription, BrokerError>> + Send;

    /// Publish a single payload on `topic`.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// A live subscription.
pub trait Subscription: Send + 'static {
    /// Wait for the next message. An error means the subscription is gone.
    fn recv(&mut self) -> impl Future<Output = Result<BrokerMessage, BrokerError>> + Send;
}
