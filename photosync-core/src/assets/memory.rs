use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use photosync_model::{PhotoIdentity, ThumbnailSize};

use super::{DerivedAssetKey, DerivedAssetStore, asset_key_for};
use crate::error::Result;

/// Process-local asset store for tests and catalog-less runs.
#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    blobs: Mutex<BTreeMap<DerivedAssetKey, Vec<u8>>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DerivedAssetKey) -> Option<Vec<u8>> {
        self.blobs.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    /// Number of variants currently stored for `identity`.
    pub fn count_for(&self, identity: &PhotoIdentity) -> usize {
        ThumbnailSize::ALL
            .iter()
            .filter(|variant| {
                self.blobs
                    .lock()
                    .contains_key(&asset_key_for(identity, **variant))
            })
            .count()
    }
}

#[async_trait]
impl DerivedAssetStore for InMemoryAssetStore {
    async fn put(
        &self,
        identity: &PhotoIdentity,
        variant: ThumbnailSize,
        bytes: Vec<u8>,
    ) -> Result<DerivedAssetKey> {
        let key = asset_key_for(identity, variant);
        self.blobs.lock().insert(key.clone(), bytes);
        Ok(key)
    }

    async fn delete_all(&self, identity: &PhotoIdentity) -> Result<()> {
        let mut blobs = self.blobs.lock();
        for variant in ThumbnailSize::ALL {
            blobs.remove(&asset_key_for(identity, variant));
        }
        Ok(())
    }
}
