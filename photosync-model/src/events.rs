use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Cheap stat facts used to short-circuit unchanged files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatTuple {
    pub size_bytes: u64,
    pub mtime: DateTime<Utc>,
}

/// A file seen on disk during a sweep or after a watch event. Transient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Forward-slash separated path relative to the watched root.
    pub relative_path: String,
    pub size_bytes: u64,
    pub mtime: DateTime<Utc>,
}

impl ObservedFile {
    pub fn stat(&self) -> StatTuple {
        StatTuple {
            size_bytes: self.size_bytes,
            mtime: self.mtime,
        }
    }
}

/// A live filesystem change under the watched root. Paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl ChangeEvent {
    /// Every path the event touches, destination first for renames.
    pub fn paths(&self) -> Vec<&PathBuf> {
        match self {
            ChangeEvent::Created(path)
            | ChangeEvent::Modified(path)
            | ChangeEvent::Removed(path) => vec![path],
            ChangeEvent::Renamed { from, to } => vec![to, from],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Created(_) => "created",
            ChangeEvent::Modified(_) => "modified",
            ChangeEvent::Removed(_) => "removed",
            ChangeEvent::Renamed { .. } => "renamed",
        }
    }
}
