//! Health, readiness and counters over HTTP.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use photosync_core::catalog::CatalogRepository;
use photosync_core::sync::{HealthReport, StatsReport, SyncHealth};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

const CATALOG_PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct AppState {
    health: Arc<SyncHealth>,
    catalog: Arc<dyn CatalogRepository>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(health: Arc<SyncHealth>, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { health, catalog }
    }

    pub fn health(&self) -> &SyncHealth {
        &self.health
    }

    /// Round-trip to the catalog, bounded so a hung pool cannot stall the
    /// health endpoint.
    async fn check_catalog(&self) -> bool {
        let connected = match tokio::time::timeout(CATALOG_PING_TIMEOUT, self.catalog.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(kind = %err.kind(), error = %err, "catalog connectivity check failed");
                false
            }
            Err(_) => {
                warn!(timeout = ?CATALOG_PING_TIMEOUT, "catalog connectivity check timed out");
                false
            }
        };
        self.health.set_database_connected(connected);
        connected
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping_handler() -> &'static str {
    "pong"
}

/// `200` only when healthy; the body is returned either way so callers can
/// tell `starting` from `degraded`.
async fn health_handler(State(state): State<AppState>) -> Response {
    state.check_catalog().await;
    let report: HealthReport = state.health().report();
    let code = if report.status.is_healthy() {
        StatusCode::OK
    } else {
        debug!(status = ?report.status, "health check not passing");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report)).into_response()
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsReport> {
    Json(state.health().stats())
}
