//! Derived-asset storage keyed by photo identity.

mod cacache_store;
mod memory;

use std::fmt;

use async_trait::async_trait;
use photosync_model::{PhotoIdentity, ThumbnailSize};

use crate::error::Result;

pub use cacache_store::{AssetCacheRoot, CacacheAssetStore};
pub use memory::InMemoryAssetStore;

/// Stable key for one derived asset.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DerivedAssetKey(String);

impl DerivedAssetKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DerivedAssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DerivedAssetKey").field(&self.0).finish()
    }
}

impl fmt::Display for DerivedAssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the versioned key for an identity and size variant.
///
/// Readers outside this process locate thumbnails by this key, so its shape
/// must stay stable: `thumbnails/v1/{identity}/{variant}`.
pub fn asset_key_for(identity: &PhotoIdentity, variant: ThumbnailSize) -> DerivedAssetKey {
    let mut key = String::with_capacity(14 + identity.as_str().len() + 1 + 6);
    key.push_str("thumbnails/v1/");
    key.push_str(identity.as_str());
    key.push('/');
    key.push_str(variant.as_str());
    DerivedAssetKey(key)
}

/// Write side of the derived-asset store. The engine never reads assets back.
#[async_trait]
pub trait DerivedAssetStore: Send + Sync {
    /// Store (or overwrite) one variant for `identity`.
    async fn put(
        &self,
        identity: &PhotoIdentity,
        variant: ThumbnailSize,
        bytes: Vec<u8>,
    ) -> Result<DerivedAssetKey>;

    /// Remove every variant stored for `identity`. Idempotent.
    async fn delete_all(&self, identity: &PhotoIdentity) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_key_is_stable_and_versioned() {
        let identity: PhotoIdentity = "ab".repeat(32).parse().unwrap();
        let key = asset_key_for(&identity, ThumbnailSize::Medium);
        assert_eq!(
            key.as_str(),
            format!("thumbnails/v1/{}/medium", "ab".repeat(32))
        );
    }
}
