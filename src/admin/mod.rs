//! Read-only admin API.
//!
//! `GET /admin/status` and `GET /admin/backends`, both behind a bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::registry::BackendRegistry;
use crate::load_balancer::SelectionStrategy;
use crate::net::connection::ConnectionTracker;

#[derive(Debug, Clone)]
pub struct AdminState {
    pub registry: Arc<BackendRegistry>,
    pub strategy: Arc<dyn SelectionStrategy>,
    pub tracker: ConnectionTracker,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve_admin(listener: TcpListener, state: AdminState, mut shutdown: ShutdownSignal) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Admin API listening");
    }
    let app = setup_admin_router(state);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await
    {
        tracing::error!(error = %e, "Admin API server failed");
    }
    tracing::info!("Admin API stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::{BackendId, BackendSet, TelemetrySample};
    use crate::load_balancer::RoundRobin;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::time::SystemTime;
    use tower::ServiceExt;

    fn state() -> AdminState {
        let registry = Arc::new(BackendRegistry::new(Arc::new(BackendSet::new(["a:1", "b:2"]))));
        registry
            .upsert(
                &BackendId::new("b:2"),
                TelemetrySample {
                    memory: 0.4,
                    disk_read: 0.2,
                    active_requests: 7,
                    observed_at: SystemTime::now(),
                },
            )
            .unwrap();
        AdminState {
            registry,
            strategy: Arc::new(RoundRobin::new()),
            tracker: ConnectionTracker::new(),
            api_key: Arc::from("secret"),
        }
    }

    fn admin_get(path: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_token() {
        let app = setup_admin_router(state());
        let resp = app.clone().oneshot(admin_get("/admin/status", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.oneshot(admin_get("/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn status_counts_backends_by_health() {
        let app = setup_admin_router(state());
        let resp = app.oneshot(admin_get("/admin/status", Some("secret"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let status: SystemStatus = serde_json::from_slice(&body).unwrap();
        assert_eq!(status.strategy, "round_robin");
        assert_eq!(status.active_sessions, 0);
        assert_eq!(
            status.backends,
            HealthCounts {
                unknown: 1,
                healthy: 1,
                stale: 0,
                unreachable: 0
            }
        );
    }

    #[tokio::test]
    async fn backends_lists_registry_in_order() {
        let app = setup_admin_router(state());
        let resp = app.oneshot(admin_get("/admin/backends", Some("secret"))).await.unwrap();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let backends: Vec<BackendStatus> = serde_json::from_slice(&body).unwrap();

        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0].address, "a:1");
        assert_eq!(backends[0].health, "unknown");
        assert!(backends[0].last_sample.is_none());
        assert_eq!(backends[1].health, "healthy");
        assert_eq!(backends[1].last_sample.as_ref().unwrap().active_requests, 7);
    }
}
