use std::{sync::Arc, time::Duration};

use anyhow::Context;
use photosync_config::SyncConfig;
use photosync_core::{
    assets::{AssetCacheRoot, CacacheAssetStore, DerivedAssetStore},
    catalog::{CatalogRepository, InMemoryCatalog, PostgresCatalog},
    scan::{FileWatcher, TreeScanner},
    sync::{ReconciliationEngine, SyncCoordinator, SyncHealth},
};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the binary needs to run once wiring succeeded.
pub struct SyncRuntime {
    pub coordinator: Arc<SyncCoordinator>,
    pub health: Arc<SyncHealth>,
    pub catalog: Arc<dyn CatalogRepository>,
}

pub async fn connect_catalog(config: &SyncConfig) -> anyhow::Result<Arc<dyn CatalogRepository>> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("no database configured; catalog changes will not survive a restart");
        return Ok(Arc::new(InMemoryCatalog::new()));
    };

    let max_connections = u32::try_from(config.max_concurrency + 2).unwrap_or(u32::MAX);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(DB_ACQUIRE_TIMEOUT)
        .connect(url)
        .await
        .with_context(|| {
            format!(
                "failed to connect to catalog database {}",
                config.database.redacted_url().unwrap_or_default()
            )
        })?;
    info!(
        url = %config.database.redacted_url().unwrap_or_default(),
        max_connections,
        "connected to catalog database"
    );
    Ok(Arc::new(PostgresCatalog::new(pool)))
}

pub fn asset_store(config: &SyncConfig) -> Arc<dyn DerivedAssetStore> {
    let root = AssetCacheRoot::new(config.thumbnail_cache_dir().to_path_buf());
    Arc::new(CacacheAssetStore::new(root))
}

/// Assemble engine, watcher and coordinator around the given persistence
/// adapters. Nothing runs until [`SyncCoordinator::start`].
pub fn build_runtime(
    config: &SyncConfig,
    catalog: Arc<dyn CatalogRepository>,
    assets: Arc<dyn DerivedAssetStore>,
) -> SyncRuntime {
    let filter = Arc::new(config.file_filter());
    let scanner = TreeScanner::new(Arc::clone(&filter));
    let engine = Arc::new(ReconciliationEngine::new(
        config.base_path().to_path_buf(),
        Arc::clone(&catalog),
        assets,
        scanner,
        config.engine_config(),
    ));
    let watcher = Arc::new(FileWatcher::new(config.watch_config(), filter));
    let health = Arc::new(SyncHealth::new());
    let coordinator = Arc::new(SyncCoordinator::new(
        engine,
        watcher,
        Arc::clone(&health),
        config.coordinator_config(),
    ));
    SyncRuntime {
        coordinator,
        health,
        catalog,
    }
}

impl std::fmt::Debug for SyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRuntime")
            .field("coordinator", &self.coordinator)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}
