//! MQTT transport (rumqttc).
//!
//! Every subscription owns its own client and event loop. When the event
//! loop reports an error the subscription is finished; the ingest drops it
//! and subscribes again with backoff, which yields a clean session.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};

use crate::config::TelemetryConfig;
use crate::telemetry::broker::{Broker, BrokerError, BrokerMessage, Subscription};

/// Capacity of the request channel between client handle and event loop.
const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct MqttBroker {
    host: String,
    port: u16,
    client_id_prefix: String,
    keep_alive: Duration,
    handshake_timeout: Duration,
}

impl MqttBroker {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_id_prefix: "lb".to_string(),
            keep_alive: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            host: config.broker_host.clone(),
            port: config.broker_port,
            client_id_prefix: config.client_id_prefix.clone(),
            keep_alive: Duration::from_secs(config.keep_alive_secs.max(1)),
            handshake_timeout: config.handshake_timeout(),
        }
    }

    fn options(&self) -> MqttOptions {
        let client_id = format!("{}-{}", self.client_id_prefix, uuid::Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options
    }

    async fn open_subscription(&self, topic: &str) -> Result<MqttSubscription, BrokerError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| BrokerError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        // Drive the connection until the broker acknowledges the subscription.
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack.return_codes.iter().any(|c| matches!(c, SubscribeReasonCode::Failure)) {
                        return Err(BrokerError::Subscribe {
                            topic: topic.to_string(),
                            reason: "rejected by broker".into(),
                        });
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(BrokerError::Unavailable(e.to_string())),
            }
        }

        tracing::info!(
            broker = %format!("{}:{}", self.host, self.port),
            topic = %topic,
            "Subscribed to telemetry topic"
        );

        Ok(MqttSubscription {
            _client: client,
            eventloop,
        })
    }

    async fn publish_once(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let publish_error = |reason: String| BrokerError::Publish {
            topic: topic.to_string(),
            reason,
        };

        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| publish_error(e.to_string()))?;

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::PubAck(_))) => break,
                Ok(_) => {}
                Err(e) => return Err(publish_error(e.to_string())),
            }
        }

        let _ = client.disconnect().await;
        // Flush the DISCONNECT packet; the loop errors once the socket closes.
        let _ = tokio::time::timeout(Duration::from_millis(200), eventloop.poll()).await;
        Ok(())
    }
}

impl Broker for MqttBroker {
    type Subscription = MqttSubscription;

    async fn subscribe(&self, topic: &str) -> Result<MqttSubscription, BrokerError> {
        tokio::time::timeout(self.handshake_timeout, self.open_subscription(topic))
            .await
            .map_err(|_| BrokerError::Timeout(self.handshake_timeout))?
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        tokio::time::timeout(self.handshake_timeout, self.publish_once(topic, payload))
            .await
            .map_err(|_| BrokerError::Timeout(self.handshake_timeout))?
    }
}

pub struct MqttSubscription {
    // Dropping the client handle would stop the event loop.
    _client: AsyncClient,
    eventloop: EventLoop,
}

impl Subscription for MqttSubscription {
    async fn recv(&mut self) -> Result<BrokerMessage, BrokerError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(BrokerMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Err(BrokerError::Disconnected("broker sent DISCONNECT".into()));
                }
                Ok(_) => {}
                Err(e) => return Err(BrokerError::Disconnected(e.to_string())),
            }
        }
    }
}
