//! Balancer server: owns the registry and runs every background task.
//!
//! # Responsibilities
//! - Build the registry and selection strategy from configuration
//! - Spawn telemetry ingest, the staleness sweep and the admin API
//! - Accept client connections and spawn one session task each
//! - Shut down in order: stop accepting, drain sessions, force-close stragglers

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::admin::{serve_admin, AdminState};
use crate::config::BalancerConfig;
use crate::health::sweep::StalenessSweeper;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::load_balancer::backend::BackendSet;
use crate::load_balancer::registry::BackendRegistry;
use crate::load_balancer::{build_strategy, SelectionStrategy};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;
use crate::proxy::session::{serve, SessionContext};
use crate::telemetry::broker::Broker;
use crate::telemetry::ingest::TelemetryIngest;

/// How long forcibly cancelled sessions get to unwind.
const FORCE_CLOSE_WAIT: Duration = Duration::from_secs(5);

/// Pause after a failed accept (e.g. EMFILE) before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct BalancerServer {
    config: BalancerConfig,
    registry: Arc<BackendRegistry>,
    strategy: Arc<dyn SelectionStrategy>,
    tracker: ConnectionTracker,
}

impl BalancerServer {
    pub fn new(config: BalancerConfig) -> Self {
        let backends = Arc::new(BackendSet::new(&config.backends));
        let registry = Arc::new(BackendRegistry::new(backends));
        let strategy = build_strategy(&config.strategy);

        tracing::info!(
            backends = registry.backends().len(),
            strategy = strategy.name(),
            "Balancer initialized"
        );

        Self {
            config,
            registry,
            strategy,
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn registry(&self) -> Arc<BackendRegistry> {
        self.registry.clone()
    }

    pub fn strategy(&self) -> Arc<dyn SelectionStrategy> {
        self.strategy.clone()
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Run until `shutdown` fires, then drain and return.
    pub async fn run<B: Broker>(
        self,
        listener: Listener,
        broker: B,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Balancer accepting connections");

        let mut background: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        if self.config.telemetry.enabled {
            let ingest = TelemetryIngest::new(broker, self.registry.clone(), &self.config.telemetry);
            background.push(("telemetry_ingest", tokio::spawn(ingest.run(shutdown.clone()))));

            let sweeper = StalenessSweeper::new(self.registry.clone(), &self.config.telemetry);
            background.push(("staleness_sweep", tokio::spawn(sweeper.run(shutdown.clone()))));
        } else {
            tracing::warn!("Telemetry disabled: backends stay Unknown and only round-robin is meaningful");
        }

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let state = AdminState {
                registry: self.registry.clone(),
                strategy: self.strategy.clone(),
                tracker: self.tracker.clone(),
                api_key: Arc::from(self.config.admin.api_key.as_str()),
            };
            background.push(("admin_api", tokio::spawn(serve_admin(admin_listener, state, shutdown.clone()))));
        }

        let ctx = Arc::new(SessionContext {
            registry: self.registry.clone(),
            strategy: self.strategy.clone(),
            dial: self.config.dial.clone(),
            drain_timeout: self.config.session.drain_timeout(),
        });
        let force = Shutdown::new();

        loop {
            let accepted = tokio::select! {
                r = listener.accept() => r,
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = self.tracker.track();
                    metrics::set_active_sessions(self.tracker.active_count());

                    let span = tracing::info_span!("session", id = %guard.id(), peer = %peer);
                    let ctx = ctx.clone();
                    let force_signal = force.subscribe();
                    let tracker = self.tracker.clone();
                    tokio::spawn(
                        async move {
                            serve(ctx, stream, force_signal).await;
                            drop(permit);
                            drop(guard);
                            metrics::set_active_sessions(tracker.active_count());
                        }
                        .instrument(span),
                    );
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        // New connections are refused from here on.
        drop(listener);
        self.drain(&force).await;

        for (name, handle) in background {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "Background task failed");
            }
        }

        tracing::info!("Balancer stopped");
        Ok(())
    }

    /// Wait for live sessions up to the grace period, then cancel the rest.
    async fn drain(&self, force: &Shutdown) {
        let grace = self.config.session.shutdown_grace();
        let active = self.tracker.active_count();
        if active == 0 {
            return;
        }

        tracing::info!(active_sessions = active, grace = ?grace, "Draining sessions");
        if tokio::time::timeout(grace, self.tracker.wait_until_idle()).await.is_ok() {
            tracing::info!("All sessions drained");
            return;
        }

        tracing::warn!(
            remaining = self.tracker.active_count(),
            "Grace period elapsed, force-closing sessions"
        );
        force.trigger();
        if tokio::time::timeout(FORCE_CLOSE_WAIT, self.tracker.wait_until_idle()).await.is_err() {
            tracing::error!(remaining = self.tracker.active_count(), "Sessions still open after force close");
        }
    }
}
