use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use photosync_model::{PhotoIdentity, PhotoRecord, PhotoStatus};

use super::CatalogRepository;
use crate::error::{Result, SyncError};
use crate::naming::is_beneath;

/// Process-local catalog. Enforces the same invariants a real backend does:
/// optimistic revisions and one active record per path.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: Mutex<HashMap<PhotoIdentity, PhotoRecord>>,
    writes: AtomicU64,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful mutating operations so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored record, tombstones included.
    pub fn all_records(&self) -> Vec<PhotoRecord> {
        let mut records: Vec<_> = self.records.lock().values().cloned().collect();
        records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        records
    }

    pub fn active_at(&self, relative_path: &str) -> Option<PhotoRecord> {
        self.records
            .lock()
            .values()
            .find(|r| r.is_active() && r.relative_path == relative_path)
            .cloned()
    }

    /// Bump a row's revision as if another writer had touched it.
    pub fn simulate_external_edit(&self, identity: &PhotoIdentity) {
        if let Some(record) = self.records.lock().get_mut(identity) {
            record.revision += 1;
        }
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn list_active_records(
        &self,
        root: Option<String>,
    ) -> Result<Vec<PhotoRecord>> {
        let records = self.records.lock();
        Ok(records
            .values()
            .filter(|r| r.is_active())
            .filter(|r| {
                root.as_deref()
                    .is_none_or(|root| is_beneath(&r.relative_path, root))
            })
            .cloned()
            .collect())
    }

    async fn find_by_identity(
        &self,
        identity: &PhotoIdentity,
    ) -> Result<Option<PhotoRecord>> {
        Ok(self.records.lock().get(identity).cloned())
    }

    async fn upsert(&self, record: &PhotoRecord) -> Result<PhotoRecord> {
        let mut records = self.records.lock();

        let stored_revision =
            records.get(&record.identity).map_or(0, |r| r.revision);
        if stored_revision != record.revision {
            return Err(SyncError::Conflict {
                identity: record.identity.clone(),
            });
        }

        if record.status.is_active() {
            let holder = records.values().find(|r| {
                r.is_active()
                    && r.relative_path == record.relative_path
                    && r.identity != record.identity
            });
            if let Some(holder) = holder {
                return Err(SyncError::Catalog(format!(
                    "path {} is already held by active identity {}",
                    record.relative_path, holder.identity
                )));
            }
        }

        let mut stored = record.clone();
        stored.revision = stored_revision + 1;
        records.insert(stored.identity.clone(), stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn mark_removed(&self, identity: &PhotoIdentity) -> Result<()> {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(identity)
            && record.status == PhotoStatus::Active
        {
            record.status = PhotoStatus::Removed;
            record.last_synced_at = Utc::now();
            record.revision += 1;
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
