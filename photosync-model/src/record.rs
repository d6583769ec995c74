use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::identity::PhotoIdentity;
use crate::metadata::{CaptureMetadata, PhotoMetadata};

/// Catalog lifecycle state of a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PhotoStatus {
    #[default]
    Active,
    /// Tombstone: the row is retained so consumers can observe the removal.
    Removed,
}

impl PhotoStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            PhotoStatus::Active => "active",
            PhotoStatus::Removed => "removed",
        }
    }

    pub const fn is_active(self) -> bool {
        matches!(self, PhotoStatus::Active)
    }
}

impl fmt::Display for PhotoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown photo status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for PhotoStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PhotoStatus::Active),
            "removed" => Ok(PhotoStatus::Removed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// The catalog entity. Keyed by [`PhotoIdentity`]; the path is mutable and
/// follows the file across renames.
///
/// `revision` is an optimistic concurrency token. A record built for a new
/// identity carries `revision == 0`; every successful catalog write bumps it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhotoRecord {
    pub identity: PhotoIdentity,
    /// Forward-slash separated path relative to the watched root.
    pub relative_path: String,
    pub category: String,
    pub filename: String,
    pub title: String,
    pub size_bytes: u64,
    pub mtime: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub orientation: u16,
    pub capture_metadata: Option<CaptureMetadata>,
    pub status: PhotoStatus,
    pub last_synced_at: DateTime<Utc>,
    pub revision: i64,
}

impl PhotoRecord {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Copy structural metadata into the record. Returns true when anything
    /// changed.
    pub fn apply_metadata(&mut self, metadata: &PhotoMetadata) -> bool {
        let changed = self.width != metadata.width
            || self.height != metadata.height
            || self.orientation != metadata.orientation
            || self.capture_metadata != metadata.capture;
        self.width = metadata.width;
        self.height = metadata.height;
        self.orientation = metadata.orientation;
        self.capture_metadata = metadata.capture.clone();
        changed
    }
}
