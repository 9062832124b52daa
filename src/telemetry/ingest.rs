//! Telemetry ingest loop.
//!
//! # Responsibilities
//! - Keep a subscription to the metrics topic open for the process lifetime
//! - Decode every message and apply it to the registry
//! - Reconnect with backoff when the broker goes away
//!
//! # Design Decisions
//! - A bad message is logged and dropped; it never stops ingestion
//! - Ingest is the only telemetry writer, so registry updates are linearized
//! - While disconnected nothing is written; the staleness sweep keeps aging records

use std::sync::Arc;

use crate::config::TelemetryConfig;
use crate::health::sweep::log_transition;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::backend::BackendId;
use crate::load_balancer::registry::BackendRegistry;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;
use crate::telemetry::broker::{Broker, BrokerError, BrokerMessage, Subscription};
use crate::telemetry::codec::{DecodeError, TelemetryCodec};

pub struct TelemetryIngest<B: Broker> {
    broker: B,
    registry: Arc<BackendRegistry>,
    codec: TelemetryCodec,
    backoff: Backoff,
}

/// Why the consume loop ended.
enum ConsumeEnd {
    Shutdown,
    Lost(BrokerError),
}

impl<B: Broker> TelemetryIngest<B> {
    pub fn new(broker: B, registry: Arc<BackendRegistry>, config: &TelemetryConfig) -> Self {
        let codec = TelemetryCodec::new(config.topic.clone(), registry.backends().clone());
        Self {
            broker,
            registry,
            codec,
            backoff: Backoff::new(config.reconnect_base_delay_ms, config.reconnect_max_delay_ms),
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let topic = self.codec.topic().to_string();
        tracing::info!(topic = %topic, "Telemetry ingest starting");

        loop {
            let subscribed = tokio::select! {
                result = self.broker.subscribe(&topic) => result,
                _ = shutdown.recv() => break,
            };

            match subscribed {
                Ok(mut subscription) => {
                    if self.backoff.attempt() > 0 {
                        metrics::record_broker_reconnect();
                        tracing::info!(topic = %topic, "Telemetry subscription restored");
                    }
                    self.backoff.reset();

                    match self.consume(&mut subscription, &mut shutdown).await {
                        ConsumeEnd::Shutdown => break,
                        ConsumeEnd::Lost(e) => {
                            tracing::warn!(error = %e, "Telemetry subscription lost");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt = self.backoff.attempt() + 1, "Telemetry subscribe failed");
                }
            }

            let delay = self.backoff.next_delay();
            tracing::debug!(delay = ?delay, "Waiting before telemetry resubscribe");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Telemetry ingest received shutdown signal, exiting loop");
    }

    async fn consume(&self, subscription: &mut B::Subscription, shutdown: &mut ShutdownSignal) -> ConsumeEnd {
        loop {
            let message = tokio::select! {
                message = subscription.recv() => message,
                _ = shutdown.recv() => return ConsumeEnd::Shutdown,
            };
            match message {
                Ok(message) => {
                    let _ = self.handle(&message);
                }
                Err(e) => return ConsumeEnd::Lost(e),
            }
        }
    }

    /// Decode one message and apply it to the registry.
    pub fn handle(&self, message: &BrokerMessage) -> Result<BackendId, DecodeError> {
        let (id, sample) = match self.codec.decode(&message.topic, &message.payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                metrics::record_telemetry("rejected");
                tracing::warn!(topic = %message.topic, error = %e, "Dropping telemetry message");
                return Err(e);
            }
        };

        match self.registry.upsert(&id, sample) {
            Ok(transition) => {
                metrics::record_telemetry("accepted");
                tracing::trace!(
                    backend = %id,
                    memory = sample.memory,
                    disk_read = sample.disk_read,
                    active_requests = sample.active_requests,
                    "Telemetry sample applied"
                );
                if let Some(t) = transition {
                    log_transition(&t);
                    metrics::record_backend_health(t.backend.as_str(), t.to);
                }
                Ok(id)
            }
            Err(e) => {
                // The codec only yields configured identities.
                metrics::record_telemetry("rejected");
                tracing::warn!(error = %e, "Dropping telemetry message");
                Err(DecodeError::UnknownBackend(id.to_string()))
            }
        }
    }
}
