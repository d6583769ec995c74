//! Persistence boundary for photo records.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

use async_trait::async_trait;
use photosync_model::{PhotoIdentity, PhotoRecord};

use crate::error::Result;

pub use memory::InMemoryCatalog;
#[cfg(feature = "postgres")]
pub use postgres::PostgresCatalog;

/// Catalog port consumed by the reconciliation engine. Every operation is a
/// single-record atomic write or a read; the engine never relies on
/// transactions spanning records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Active records, optionally restricted to paths beneath `root`
    /// (a forward-slash prefix relative to the watched tree).
    async fn list_active_records(
        &self,
        root: Option<String>,
    ) -> Result<Vec<PhotoRecord>>;

    /// Record for `identity` in any status.
    async fn find_by_identity(
        &self,
        identity: &PhotoIdentity,
    ) -> Result<Option<PhotoRecord>>;

    /// Create-or-update by identity. The write only applies when the stored
    /// revision equals `record.revision` (0 for a new identity); otherwise
    /// fails with [`crate::SyncError::Conflict`]. Returns the stored record
    /// with its bumped revision.
    async fn upsert(&self, record: &PhotoRecord) -> Result<PhotoRecord>;

    /// Flag the record as removed. Idempotent.
    async fn mark_removed(&self, identity: &PhotoIdentity) -> Result<()>;

    /// Cheap round-trip used by health reporting.
    async fn ping(&self) -> Result<()>;
}
