//! In-process broker.
//!
//! Topics are tokio broadcast channels. `disconnect` drops every channel so
//! open subscriptions observe a disconnect, and refuses new subscriptions and
//! publishes until `reconnect` is called.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::telemetry::broker::{Broker, BrokerError, BrokerMessage, Subscription};

const TOPIC_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    topics: Mutex<HashMap<String, broadcast::Sender<BrokerMessage>>>,
    online: AtomicBool,
    subscribe_attempts: AtomicU64,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                online: AtomicBool::new(true),
                subscribe_attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Simulate the broker going away.
    pub fn disconnect(&self) {
        self.inner.online.store(false, Ordering::SeqCst);
        self.inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Bring the broker back.
    pub fn reconnect(&self) {
        self.inner.online.store(true, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Number of subscribe calls, successful or not.
    pub fn subscribe_attempts(&self) -> u64 {
        self.inner.subscribe_attempts.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker for MemoryBroker {
    type Subscription = MemorySubscription;

    async fn subscribe(&self, topic: &str) -> Result<MemorySubscription, BrokerError> {
        self.inner.subscribe_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.is_online() {
            return Err(BrokerError::Unavailable("memory broker offline".into()));
        }

        let mut topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let rx = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();
        Ok(MemorySubscription { rx })
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if !self.is_online() {
            return Err(BrokerError::Publish {
                topic: topic.to_string(),
                reason: "memory broker offline".into(),
            });
        }

        let topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = topics.get(topic) {
            // No subscribers is not an error: MQTT drops such messages too.
            let _ = tx.send(BrokerMessage {
                topic: topic.to_string(),
                payload,
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemorySubscription {
    rx: broadcast::Receiver<BrokerMessage>,
}

impl Subscription for MemorySubscription {
    async fn recv(&mut self) -> Result<BrokerMessage, BrokerError> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Ok(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Telemetry subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BrokerError::Disconnected("memory broker closed topic".into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_subscribers() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("t").await.unwrap();
        broker.publish("t", b"hello".to_vec()).await.unwrap();
        broker.publish("other", b"ignored".to_vec()).await.unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.topic, "t");
        assert_eq!(msg.payload, b"hello");
    }

    #[tokio::test]
    async fn disconnect_ends_subscriptions_until_reconnect() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("t").await.unwrap();

        broker.disconnect();
        assert!(matches!(sub.recv().await, Err(BrokerError::Disconnected(_))));
        assert!(matches!(broker.subscribe("t").await, Err(BrokerError::Unavailable(_))));
        assert!(broker.publish("t", vec![]).await.is_err());

        broker.reconnect();
        let mut sub = broker.subscribe("t").await.unwrap();
        broker.publish("t", b"back".to_vec()).await.unwrap();
        assert_eq!(sub.recv().await.unwrap().payload, b"back");
        assert_eq!(broker.subscribe_attempts(), 3);
    }
}
