//! Per-connection session state machine.
//!
//! ```text
//! Accepted → Selecting → Dialing → Forwarding → Closed
//!                ▲           │
//!                └───────────┘  dial failed, attempts left
//! ```
//!
//! Selection sees a fresh registry snapshot on every attempt, minus the
//! backends this session already tried. Any error closes the client socket;
//! nothing is written to it before forwarding starts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::DialConfig;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::backend::BackendId;
use crate::load_balancer::registry::BackendRegistry;
use crate::load_balancer::SelectionStrategy;
use crate::net::connection::SessionState;
use crate::observability::metrics;
use crate::proxy::relay::{relay, RelayError, RelayStats};
use crate::resilience::timeouts::{connect_with_timeout, DialError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no eligible backend")]
    NoEligibleBackend,

    #[error("all {attempts} dial attempts failed, last: {last}")]
    DialExhausted {
        attempts: u32,
        #[source]
        last: DialError,
    },

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Outcome label for `lb_sessions_total`.
    pub fn outcome(&self) -> &'static str {
        match self {
            SessionError::NoEligibleBackend => "no_backend",
            SessionError::DialExhausted { .. } => "dial_failed",
            SessionError::Relay(RelayError::Cancelled) | SessionError::Cancelled => "cancelled",
            SessionError::Relay(RelayError::Idle { .. }) => "drain_idle",
            SessionError::Relay(_) => "relay_error",
        }
    }
}

/// Everything a session needs, shared by all sessions of one server.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub registry: Arc<BackendRegistry>,
    pub strategy: Arc<dyn SelectionStrategy>,
    pub dial: DialConfig,
    pub drain_timeout: Duration,
}

/// Result of a session that reached forwarding.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub backend: BackendId,
    pub attempts: u32,
    pub stats: RelayStats,
}

fn enter(state: SessionState) {
    tracing::trace!(state = %state, "Session state");
}

/// Drive one accepted client connection to completion.
///
/// `force` is the forced-close signal: it cancels an in-flight dial or relay.
pub async fn run_session(
    ctx: &SessionContext,
    client: TcpStream,
    mut force: ShutdownSignal,
) -> Result<SessionSummary, SessionError> {
    enter(SessionState::Accepted);

    let (backend, upstream, attempts) = select_and_dial(ctx, &mut force).await?;

    enter(SessionState::Forwarding);
    if let Err(e) = client.set_nodelay(true).and_then(|()| upstream.set_nodelay(true)) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    let (stats, result) = relay(client, upstream, ctx.drain_timeout, &mut force).await;
    enter(SessionState::Closed);

    metrics::record_relay_bytes(backend.as_str(), stats.to_backend, stats.to_client);
    if let Err(e) = result {
        tracing::debug!(
            backend = %backend,
            bytes_to_backend = stats.to_backend,
            bytes_to_client = stats.to_client,
            "Relay ended early"
        );
        return Err(e.into());
    }
    Ok(SessionSummary {
        backend,
        attempts,
        stats,
    })
}

async fn select_and_dial(
    ctx: &SessionContext,
    force: &mut ShutdownSignal,
) -> Result<(BackendId, TcpStream, u32), SessionError> {
    let max_attempts = ctx.dial.max_attempts.max(1);
    let mut tried: Vec<BackendId> = Vec::new();
    let mut last_error: Option<DialError> = None;

    while (tried.len() as u32) < max_attempts {
        enter(SessionState::Selecting);
        let snapshot = ctx.registry.snapshot();
        let candidates = snapshot.without(&tried);
        let Some(backend) = ctx.strategy.pick(&candidates) else {
            break;
        };
        metrics::record_selection(backend.as_str());
        tracing::debug!(backend = %backend, attempt = tried.len() + 1, strategy = ctx.strategy.name(), "Backend selected");

        enter(SessionState::Dialing);
        let dialed = tokio::select! {
            r = connect_with_timeout(&backend, ctx.dial.connect_timeout()) => r,
            _ = force.recv() => return Err(SessionError::Cancelled),
        };

        match dialed {
            Ok(stream) => {
                let attempts = tried.len() as u32 + 1;
                return Ok((backend, stream, attempts));
            }
            Err(e) => {
                tracing::warn!(backend = %backend, error = %e, "Backend dial failed");
                metrics::record_dial_failure(backend.as_str(), e.kind());
                tried.push(backend);
                last_error = Some(e);
            }
        }
    }

    enter(SessionState::Closed);
    match last_error {
        Some(last) => Err(SessionError::DialExhausted {
            attempts: tried.len() as u32,
            last,
        }),
        None => Err(SessionError::NoEligibleBackend),
    }
}

/// Run a session and account for its outcome.
pub async fn serve(ctx: Arc<SessionContext>, client: TcpStream, force: ShutdownSignal) {
    let started = Instant::now();
    match run_session(&ctx, client, force).await {
        Ok(summary) => {
            metrics::record_session("completed", started);
            tracing::debug!(
                backend = %summary.backend,
                attempts = summary.attempts,
                bytes_to_backend = summary.stats.to_backend,
                bytes_to_client = summary.stats.to_client,
                duration_ms = started.elapsed().as_millis() as u64,
                "Session closed"
            );
        }
        Err(e) => {
            metrics::record_session(e.outcome(), started);
            match &e {
                SessionError::NoEligibleBackend | SessionError::DialExhausted { .. } => {
                    tracing::warn!(error = %e, "Session could not be routed, closing client");
                }
                SessionError::Relay(_) | SessionError::Cancelled => {
                    tracing::debug!(error = %e, "Session ended");
                }
            }
        }
    }
}
