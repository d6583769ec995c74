use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use photosync_model::{PhotoIdentity, ThumbnailSize};
use tracing::debug;

use super::{DerivedAssetKey, DerivedAssetStore, asset_key_for};
use crate::error::{Result, SyncError};

/// Root directory managed by `cacache` (index + content-addressed blobs).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AssetCacheRoot(PathBuf);

impl AssetCacheRoot {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Debug for AssetCacheRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AssetCacheRoot").field(&self.0).finish()
    }
}

/// A thin typed wrapper over `cacache` for thumbnail blobs.
#[derive(Clone, Debug)]
pub struct CacacheAssetStore {
    root: AssetCacheRoot,
}

impl CacacheAssetStore {
    pub fn new(root: AssetCacheRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &AssetCacheRoot {
        &self.root
    }

    /// Read a stored variant back. Used by tests and operators; the engine
    /// itself is write-only.
    pub async fn read(&self, key: &DerivedAssetKey) -> Result<Option<Vec<u8>>> {
        match cacache::read(self.root.as_path(), key.as_str()).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(cacache::Error::EntryNotFound(_, _)) => Ok(None),
            Err(e) => Err(SyncError::AssetStore(format!(
                "cacache read failed for {key}: {e}"
            ))),
        }
    }

    async fn remove(&self, key: &DerivedAssetKey) -> Result<bool> {
        let meta = cacache::metadata(self.root.as_path(), key.as_str())
            .await
            .map_err(|e| {
                SyncError::AssetStore(format!("cacache metadata failed: {e}"))
            })?;
        let Some(meta) = meta else {
            return Ok(false);
        };

        cacache::index::RemoveOpts::new()
            .remove_fully(true)
            .remove(self.root.as_path(), key.as_str())
            .await
            .map_err(|e| {
                SyncError::AssetStore(format!("cacache remove failed: {e}"))
            })?;

        // Content may already be gone if another key shared the blob.
        if let Err(e) =
            cacache::remove_hash(self.root.as_path(), &meta.integrity).await
        {
            debug!(key = %key, error = %e, "cacache content already removed");
        }
        Ok(true)
    }
}

#[async_trait]
impl DerivedAssetStore for CacacheAssetStore {
    async fn put(
        &self,
        identity: &PhotoIdentity,
        variant: ThumbnailSize,
        bytes: Vec<u8>,
    ) -> Result<DerivedAssetKey> {
        let key = asset_key_for(identity, variant);
        cacache::write(self.root.as_path(), key.as_str(), bytes)
            .await
            .map_err(|e| {
                SyncError::AssetStore(format!("cacache write failed: {e}"))
            })?;
        Ok(key)
    }

    async fn delete_all(&self, identity: &PhotoIdentity) -> Result<()> {
        let mut removed = 0usize;
        for variant in ThumbnailSize::ALL {
            if self.remove(&asset_key_for(identity, variant)).await? {
                removed += 1;
            }
        }
        debug!(identity = %identity.short(), removed, "deleted derived assets");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn identity() -> PhotoIdentity {
        "cd".repeat(32).parse().unwrap()
    }

    #[tokio::test]
    async fn put_overwrites_and_delete_all_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = CacacheAssetStore::new(AssetCacheRoot::new(dir.path().to_path_buf()));
        let id = identity();

        let key = store.put(&id, ThumbnailSize::Small, b"one".to_vec()).await.unwrap();
        store.put(&id, ThumbnailSize::Small, b"two".to_vec()).await.unwrap();
        assert_eq!(store.read(&key).await.unwrap().as_deref(), Some(&b"two"[..]));

        store.delete_all(&id).await.unwrap();
        assert_eq!(store.read(&key).await.unwrap(), None);
        store.delete_all(&id).await.unwrap();
    }
}
