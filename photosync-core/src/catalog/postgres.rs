use async_trait::async_trait;
use chrono::{DateTime, Utc};
use photosync_model::{CaptureMetadata, PhotoIdentity, PhotoRecord, PhotoStatus};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::debug;

use super::CatalogRepository;
use crate::error::{Result, SyncError};

const PHOTO_COLUMNS: &str = "identity, relative_path, category, filename, title, \
     size_bytes, file_modified_at, width, height, orientation, \
     capture_metadata, status, last_synced_at, revision";

/// Postgres-backed catalog.
///
/// Schema and migrations are owned outside this crate. Expected shape:
///
/// ```sql
/// CREATE TABLE photos (
///     identity         TEXT PRIMARY KEY,
///     relative_path    TEXT NOT NULL,
///     category         TEXT NOT NULL,
///     filename         TEXT NOT NULL,
///     title            TEXT NOT NULL,
///     size_bytes       BIGINT NOT NULL,
///     file_modified_at TIMESTAMPTZ NOT NULL,
///     width            INTEGER NOT NULL,
///     height           INTEGER NOT NULL,
///     orientation      SMALLINT NOT NULL DEFAULT 1,
///     capture_metadata JSONB,
///     status           TEXT NOT NULL,
///     last_synced_at   TIMESTAMPTZ NOT NULL,
///     revision         BIGINT NOT NULL
/// );
/// CREATE UNIQUE INDEX photos_active_path
///     ON photos (relative_path) WHERE status = 'active';
/// ```
#[derive(Clone, Debug)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalog {
    async fn list_active_records(
        &self,
        root: Option<String>,
    ) -> Result<Vec<PhotoRecord>> {
        let rows = match root {
            Some(root) => {
                let pattern = format!("{}/%", escape_like(root.trim_end_matches('/')));
                sqlx::query_as::<_, PhotoRow>(&format!(
                    "SELECT {PHOTO_COLUMNS} FROM photos \
                     WHERE status = 'active' AND relative_path LIKE $1 ESCAPE '\\' \
                     ORDER BY relative_path"
                ))
                .bind(pattern)
                .fetch_all(self.pool())
                .await
            }
            None => {
                sqlx::query_as::<_, PhotoRow>(&format!(
                    "SELECT {PHOTO_COLUMNS} FROM photos \
                     WHERE status = 'active' ORDER BY relative_path"
                ))
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(|e| {
            SyncError::Catalog(format!("Failed to list active photos: {e}"))
        })?;

        rows.into_iter().map(PhotoRecord::try_from).collect()
    }

    async fn find_by_identity(
        &self,
        identity: &PhotoIdentity,
    ) -> Result<Option<PhotoRecord>> {
        let row = sqlx::query_as::<_, PhotoRow>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE identity = $1"
        ))
        .bind(identity.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            SyncError::Catalog(format!("Failed to load photo {identity}: {e}"))
        })?;

        row.map(PhotoRecord::try_from).transpose()
    }

    async fn upsert(&self, record: &PhotoRecord) -> Result<PhotoRecord> {
        let size_bytes = i64::try_from(record.size_bytes).map_err(|_| {
            SyncError::Catalog(format!(
                "size {} does not fit the catalog column",
                record.size_bytes
            ))
        })?;

        let row = sqlx::query_as::<_, PhotoRow>(&format!(
            r#"
            INSERT INTO photos ({PHOTO_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 1)
            ON CONFLICT (identity) DO UPDATE SET
                relative_path = EXCLUDED.relative_path,
                category = EXCLUDED.category,
                filename = EXCLUDED.filename,
                title = EXCLUDED.title,
                size_bytes = EXCLUDED.size_bytes,
                file_modified_at = EXCLUDED.file_modified_at,
                width = EXCLUDED.width,
                height = EXCLUDED.height,
                orientation = EXCLUDED.orientation,
                capture_metadata = EXCLUDED.capture_metadata,
                status = EXCLUDED.status,
                last_synced_at = EXCLUDED.last_synced_at,
                revision = photos.revision + 1
            WHERE photos.revision = $14
            RETURNING {PHOTO_COLUMNS}
            "#
        ))
        .bind(record.identity.as_str())
        .bind(&record.relative_path)
        .bind(&record.category)
        .bind(&record.filename)
        .bind(&record.title)
        .bind(size_bytes)
        .bind(record.mtime)
        .bind(record.width as i32)
        .bind(record.height as i32)
        .bind(record.orientation as i16)
        .bind(record.capture_metadata.clone().map(Json))
        .bind(record.status.as_str())
        .bind(record.last_synced_at)
        .bind(record.revision)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                SyncError::Catalog(format!(
                    "path {} is already held by another active photo: {e}",
                    record.relative_path
                ))
            }
            _ => SyncError::Catalog(format!(
                "Failed to upsert photo {}: {e}",
                record.identity
            )),
        })?;

        match row {
            Some(row) => {
                debug!(identity = %record.identity.short(), "catalog upsert");
                PhotoRecord::try_from(row)
            }
            None => Err(SyncError::Conflict {
                identity: record.identity.clone(),
            }),
        }
    }

    async fn mark_removed(&self, identity: &PhotoIdentity) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE photos
            SET status = 'removed', last_synced_at = NOW(), revision = revision + 1
            WHERE identity = $1 AND status = 'active'
            "#,
        )
        .bind(identity.as_str())
        .execute(self.pool())
        .await
        .map_err(|e| {
            SyncError::Catalog(format!("Failed to mark photo {identity} removed: {e}"))
        })?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(|e| SyncError::Catalog(format!("Catalog database unreachable: {e}")))?;
        Ok(())
    }
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

// Database row type for photos
#[derive(sqlx::FromRow)]
struct PhotoRow {
    identity: String,
    relative_path: String,
    category: String,
    filename: String,
    title: String,
    size_bytes: i64,
    file_modified_at: DateTime<Utc>,
    width: i32,
    height: i32,
    orientation: i16,
    capture_metadata: Option<Json<CaptureMetadata>>,
    status: String,
    last_synced_at: DateTime<Utc>,
    revision: i64,
}

impl TryFrom<PhotoRow> for PhotoRecord {
    type Error = SyncError;

    fn try_from(row: PhotoRow) -> Result<Self> {
        let identity = row
            .identity
            .parse::<PhotoIdentity>()
            .map_err(|e| SyncError::Catalog(e.to_string()))?;
        let status = row
            .status
            .parse::<PhotoStatus>()
            .map_err(|e| SyncError::Catalog(e.to_string()))?;

        Ok(PhotoRecord {
            identity,
            relative_path: row.relative_path,
            category: row.category,
            filename: row.filename,
            title: row.title,
            size_bytes: u64::try_from(row.size_bytes).unwrap_or_default(),
            mtime: row.file_modified_at,
            width: u32::try_from(row.width).unwrap_or_default(),
            height: u32::try_from(row.height).unwrap_or_default(),
            orientation: u16::try_from(row.orientation).unwrap_or(1),
            capture_metadata: row.capture_metadata.map(|json| json.0),
            status,
            last_synced_at: row.last_synced_at,
            revision: row.revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_patterns_escape_wildcards() {
        assert_eq!(escape_like("100%_real"), "100\\%\\_real");
        assert_eq!(escape_like("Travel"), "Travel");
    }
}
