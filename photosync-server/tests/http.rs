use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use photosync_config::{ConfigLoader, SyncConfig};
use photosync_core::{
    Result, SyncError,
    assets::InMemoryAssetStore,
    catalog::{CatalogRepository, InMemoryCatalog},
    model::{PhotoIdentity, PhotoRecord, SyncStats},
    sync::SyncHealth,
};
use photosync_server::{
    http::{AppState, router},
    startup::build_runtime,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Catalog whose database went away.
struct UnreachableCatalog;

#[async_trait]
impl CatalogRepository for UnreachableCatalog {
    async fn list_active_records(&self, _root: Option<String>) -> Result<Vec<PhotoRecord>> {
        Err(SyncError::Catalog("connection refused".to_string()))
    }

    async fn find_by_identity(&self, _identity: &PhotoIdentity) -> Result<Option<PhotoRecord>> {
        Err(SyncError::Catalog("connection refused".to_string()))
    }

    async fn upsert(&self, _record: &PhotoRecord) -> Result<PhotoRecord> {
        Err(SyncError::Catalog("connection refused".to_string()))
    }

    async fn mark_removed(&self, _identity: &PhotoIdentity) -> Result<()> {
        Err(SyncError::Catalog("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<()> {
        Err(SyncError::Catalog("connection refused".to_string()))
    }
}

async fn get(health: Arc<SyncHealth>, uri: &str) -> (StatusCode, Vec<u8>) {
    send(AppState::new(health, Arc::new(InMemoryCatalog::new())), uri).await
}

async fn send(state: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(health: Arc<SyncHealth>, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(health, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn sweep_stats(added: u64) -> SyncStats {
    SyncStats {
        files_scanned: added,
        added,
        duration: Duration::from_millis(40),
        ..Default::default()
    }
}

fn config_for(dir: &TempDir) -> SyncConfig {
    let base = dir.path().to_string_lossy().into_owned();
    let env: HashMap<&str, String> = HashMap::from([
        ("SYNC_PHOTOS_BASE_PATH", base),
        ("SYNC_EVENT_DEBOUNCE_DELAY", "0.05".to_string()),
        ("SYNC_THUMBNAIL_SIZES", "small".to_string()),
    ]);
    ConfigLoader::new()
        .load_from_lookup(|key| env.get(key).cloned())
        .unwrap()
        .config
}

#[tokio::test]
async fn ping_answers_pong() {
    let (status, body) = get(Arc::new(SyncHealth::new()), "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"pong");
}

#[tokio::test]
async fn health_is_unavailable_until_the_first_sweep() {
    let health = Arc::new(SyncHealth::new());
    health.set_timer_alive(true);
    health.set_watcher_alive(true);

    let (status, body) = get_json(Arc::clone(&health), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "starting");
    assert_eq!(body["ready"], false);

    health.record_sweep(&sweep_stats(2));
    let (status, body) = get_json(health, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["ready"], true);
    assert_eq!(body["watcher_active"], true);
    assert_eq!(body["timer_active"], true);
    assert_eq!(body["database_connected"], true);
    assert!(body["last_sync"].is_string());
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn lost_watcher_reports_degraded_and_lost_timer_unhealthy() {
    let health = Arc::new(SyncHealth::new());
    health.set_timer_alive(true);
    health.record_sweep(&sweep_stats(0));
    health.set_watcher_alive(false);
    health.set_watcher_degraded(true);

    let (status, body) = get_json(Arc::clone(&health), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["watcher_degraded"], true);

    health.set_timer_alive(false);
    let (status, body) = get_json(health, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn unreachable_catalog_makes_health_unhealthy() {
    let health = Arc::new(SyncHealth::new());
    health.set_timer_alive(true);
    health.set_watcher_alive(true);
    health.record_sweep(&sweep_stats(1));

    let (status, body) = send(
        AppState::new(Arc::clone(&health), Arc::new(UnreachableCatalog)),
        "/health",
    )
    .await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["database_connected"], false);

    // Connectivity is rechecked on every request.
    let (status, body) = get_json(health, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database_connected"], true);
}

#[tokio::test]
async fn stats_accumulate_sweeps_and_batches() {
    let health = Arc::new(SyncHealth::new());
    health.record_sweep(&sweep_stats(3));
    health.record_sweep(&sweep_stats(1));
    health.record_batch(
        4,
        &SyncStats {
            removed: 1,
            errors: 1,
            ..Default::default()
        },
    );

    let (status, body) = get_json(health, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sweeps_completed"], 2);
    assert_eq!(body["files_added"], 4);
    assert_eq!(body["files_removed"], 1);
    assert_eq!(body["events_processed"], 4);
    assert_eq!(body["events_failed"], 1);
    assert_eq!(body["average_sweep_ms"], 40);
    assert_eq!(body["last_sweep"]["added"], 1);
    assert!(body["last_full_sync"].is_string());
}

#[tokio::test]
async fn wired_runtime_becomes_healthy_after_startup_and_stops_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir);

    let catalog = Arc::new(InMemoryCatalog::new());
    let assets = Arc::new(InMemoryAssetStore::new());
    let runtime = build_runtime(&config, catalog, assets);

    let (status, _) = get_json(Arc::clone(&runtime.health), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    runtime.coordinator.start().await.unwrap();
    let (status, body) = get_json(Arc::clone(&runtime.health), "/health").await;
    assert_eq!(status, StatusCode::OK, "{body}");

    runtime.coordinator.shutdown().await;
    assert!(runtime.coordinator.take_fatal().is_none());
    let (status, body) = get_json(runtime.health, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}
