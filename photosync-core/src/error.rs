use std::fmt;
use std::path::PathBuf;

use photosync_model::PhotoIdentity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The file could not be opened or read (permissions, deleted mid-read,
    /// still being written). Skip for this pass and retry on the next one.
    #[error("unreadable file {path}: {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes do not decode as a supported image. Never destructive.
    #[error("invalid image {path}: {reason}")]
    InvalidImage { path: PathBuf, reason: String },

    /// A concurrent writer changed the catalog row.
    #[error("catalog conflict for identity {identity}")]
    Conflict { identity: PhotoIdentity },

    #[error("watch provider error: {0}")]
    WatchProvider(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("derived asset store error: {0}")]
    AssetStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error tag attached to per-path log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncErrorKind {
    UnreadableFile,
    InvalidImage,
    Conflict,
    WatchProvider,
    Configuration,
    Catalog,
    AssetStore,
    Io,
    Internal,
}

impl SyncErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncErrorKind::UnreadableFile => "unreadable_file",
            SyncErrorKind::InvalidImage => "invalid_image",
            SyncErrorKind::Conflict => "conflict",
            SyncErrorKind::WatchProvider => "watch_provider",
            SyncErrorKind::Configuration => "configuration",
            SyncErrorKind::Catalog => "catalog",
            SyncErrorKind::AssetStore => "asset_store",
            SyncErrorKind::Io => "io",
            SyncErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::UnreadableFile { .. } => SyncErrorKind::UnreadableFile,
            SyncError::InvalidImage { .. } => SyncErrorKind::InvalidImage,
            SyncError::Conflict { .. } => SyncErrorKind::Conflict,
            SyncError::WatchProvider(_) => SyncErrorKind::WatchProvider,
            SyncError::Configuration(_) => SyncErrorKind::Configuration,
            SyncError::Catalog(_) => SyncErrorKind::Catalog,
            SyncError::AssetStore(_) => SyncErrorKind::AssetStore,
            SyncError::Io(_) => SyncErrorKind::Io,
            SyncError::Serialization(_) | SyncError::Internal(_) => {
                SyncErrorKind::Internal
            }
        }
    }

    pub(crate) fn unreadable(
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        SyncError::UnreadableFile {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_image(
        path: impl Into<PathBuf>,
        reason: impl fmt::Display,
    ) -> Self {
        SyncError::InvalidImage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
