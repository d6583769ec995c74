//! Shared harness for engine integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use photosync_core::assets::InMemoryAssetStore;
use photosync_core::catalog::InMemoryCatalog;
use photosync_core::model::{PhotoIdentity, SyncStats, ThumbnailSize};
use photosync_core::scan::{FileFilter, TreeScanner};
use photosync_core::sync::{EngineConfig, ReconciliationEngine};
use tempfile::TempDir;

/// A temp photo tree wired to an in-memory catalog and asset store.
pub struct SyncHarness {
    _dir: TempDir,
    pub root: PathBuf,
    pub catalog: Arc<InMemoryCatalog>,
    pub assets: Arc<InMemoryAssetStore>,
    pub engine: Arc<ReconciliationEngine>,
}

impl SyncHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        let catalog = Arc::new(InMemoryCatalog::new());
        let assets = Arc::new(InMemoryAssetStore::new());
        let engine = build_engine(&root, &catalog, &assets);
        Self {
            _dir: dir,
            root,
            catalog,
            assets,
            engine,
        }
    }

    /// A fresh engine over the same tree and catalog, as after a restart.
    pub fn restart(&mut self) {
        self.engine = build_engine(&self.root, &self.catalog, &self.assets);
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Write a solid-color PNG at `rel`, creating parent directories.
    pub fn write_png(&self, rel: &str, color: [u8; 3], width: u32, height: u32) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        image::RgbImage::from_pixel(width, height, image::Rgb(color))
            .save(&path)
            .expect("write png");
        path
    }

    pub fn write_bytes(&self, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, bytes).expect("write bytes");
        path
    }

    pub async fn sweep(&self) -> SyncStats {
        self.engine
            .sweep()
            .await
            .expect("sweep should succeed")
            .expect("no concurrent sweep")
    }

    pub fn identity_at(&self, rel: &str) -> PhotoIdentity {
        self.catalog
            .active_at(rel)
            .unwrap_or_else(|| panic!("no active record at {rel}"))
            .identity
    }
}

fn build_engine(
    root: &Path,
    catalog: &Arc<InMemoryCatalog>,
    assets: &Arc<InMemoryAssetStore>,
) -> Arc<ReconciliationEngine> {
    Arc::new(ReconciliationEngine::new(
        root,
        catalog.clone(),
        assets.clone(),
        TreeScanner::new(Arc::new(FileFilter::default())),
        EngineConfig {
            max_concurrency: 4,
            thumbnail_sizes: vec![ThumbnailSize::Small],
            walk_buffer: 16,
        },
    ))
}
