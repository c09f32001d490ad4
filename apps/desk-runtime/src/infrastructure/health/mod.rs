//! Snapshot, Health, and Metrics Endpoint
//!
//! HTTP surface of the headless desk: the read-side snapshot, health checks,
//! and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /snapshot?viewport=<px>` - Desk snapshot for a viewport width
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (initial bootstrap finished)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::runtime::DeskRuntime;
use crate::application::services::AuthMode;
use crate::application::state::TopicHealth;
use crate::domain::feed::{FeedStatus, Topic};
use crate::infrastructure::metrics::get_metrics_handle;

/// Viewport used when `/snapshot` is called without one.
pub const DEFAULT_VIEWPORT_PX: u32 = 1440;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Runtime version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Whether the initial bootstrap finished.
    pub ready: bool,
    /// Persistence mode.
    pub auth_mode: AuthMode,
    /// Aggregate feed status.
    pub feed_status: FeedStatus,
    /// Per-topic feed health.
    pub topics: Vec<TopicHealth>,
    /// Time of the last applied tick.
    pub last_sync: Option<DateTime<Utc>>,
    /// Desk event subscribers.
    pub event_receivers: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Streaming, or nothing to stream.
    Healthy,
    /// Serving from the polling fallback.
    Degraded,
    /// Polling keeps failing.
    Unhealthy,
}

impl From<FeedStatus> for HealthStatus {
    fn from(status: FeedStatus) -> Self {
        match status {
            FeedStatus::Idle | FeedStatus::Live => Self::Healthy,
            FeedStatus::Polling => Self::Degraded,
            FeedStatus::Degraded => Self::Unhealthy,
        }
    }
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the HTTP server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    runtime: Arc<DeskRuntime>,
    ready: AtomicBool,
}

impl HealthServerState {
    /// Create server state around a runtime.
    #[must_use]
    pub fn new(version: String, runtime: Arc<DeskRuntime>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            runtime,
            ready: AtomicBool::new(false),
        }
    }

    /// Mark the initial bootstrap as finished.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Whether the initial bootstrap finished.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Snapshot and health HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Desk HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Desk HTTP server stopped");
        Ok(())
    }
}

/// Routes served by [`HealthServer`].
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/snapshot", get(snapshot_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
struct SnapshotQuery {
    viewport: Option<u32>,
}

async fn snapshot_handler(
    State(state): State<Arc<HealthServerState>>,
    Query(query): Query<SnapshotQuery>,
) -> impl IntoResponse {
    let viewport = query.viewport.unwrap_or(DEFAULT_VIEWPORT_PX);
    Json(state.runtime.snapshot(viewport))
}

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let desk = state.runtime.state();
    let feed_status = desk.feed_status();

    HealthResponse {
        status: feed_status.into(),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        ready: state.is_ready(),
        auth_mode: state.runtime.auth_mode(),
        feed_status,
        topics: Topic::all()
            .iter()
            .filter_map(|topic| desk.topic_health(*topic))
            .collect(),
        last_sync: desk.last_sync(),
        event_receivers: state.runtime.events().stats().event_receivers,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::application::events::EventHub;
    use crate::application::ports::{
        MockContextFetcher, MockFeedPoller, MockLocalStore, MockPanelFetcher, MockProfileApi,
    };
    use crate::application::runtime::DeskPorts;
    use crate::infrastructure::config::DeskConfig;

    fn server_state() -> Arc<HealthServerState> {
        let runtime = DeskRuntime::new(
            DeskConfig::default(),
            DeskPorts {
                panels: Arc::new(MockPanelFetcher::new()),
                context: Arc::new(MockContextFetcher::new()),
                poller: Arc::new(MockFeedPoller::new()),
                push: None,
                profile: Arc::new(MockProfileApi::new()),
                local: Arc::new(MockLocalStore::new()),
            },
            Arc::new(EventHub::with_defaults()),
        );
        Arc::new(HealthServerState::new("0.1.0".to_string(), Arc::new(runtime)))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[test]
    fn health_status_follows_feed_status() {
        assert_eq!(HealthStatus::from(FeedStatus::Idle), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from(FeedStatus::Live), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from(FeedStatus::Polling), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from(FeedStatus::Degraded), HealthStatus::Unhealthy);
        assert_eq!(
            serde_json::to_value(HealthStatus::Degraded).unwrap(),
            json!("degraded")
        );
    }

    #[tokio::test]
    async fn snapshot_collapses_below_breakpoint() {
        let state = server_state();

        let (status, wide) = get_json(router(Arc::clone(&state)), "/snapshot?viewport=1600").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(wide["collapsed"], json!(false));
        assert_eq!(wide["viewportWidth"], json!(1600));

        let (_, narrow) = get_json(router(state), "/snapshot?viewport=480").await;
        assert_eq!(narrow["collapsed"], json!(true));
    }

    #[tokio::test]
    async fn readiness_waits_for_bootstrap() {
        let state = server_state();

        let response = router(Arc::clone(&state))
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.mark_ready();
        let (status, health) = get_json(router(Arc::clone(&state)), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], json!("healthy"));
        assert_eq!(health["ready"], json!(true));
        assert_eq!(health["auth_mode"], json!("guest"));

        let response = router(state)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
