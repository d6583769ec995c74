//! Content hashing. Identity is derived from file bytes only, so a rename of
//! unchanged bytes keeps its identity.

use std::fs::{self, File, Metadata};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use photosync_model::{PhotoIdentity, StatTuple};
use sha2::{Digest, Sha256};
use tokio::task::spawn_blocking;

use crate::error::{Result, SyncError};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Result of hashing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub identity: PhotoIdentity,
    pub size_bytes: u64,
    pub mtime: DateTime<Utc>,
}

impl Fingerprint {
    pub fn stat(&self) -> StatTuple {
        StatTuple {
            size_bytes: self.size_bytes,
            mtime: self.mtime,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentFingerprinter {
    buffer_size: usize,
}

impl Default for ContentFingerprinter {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ContentFingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash the file at `path` on the blocking pool.
    ///
    /// Fails with [`SyncError::UnreadableFile`] when the file cannot be opened
    /// or read, or when its size or mtime moved while it was being hashed
    /// (still being written).
    pub async fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        let path = path.to_path_buf();
        let buffer_size = self.buffer_size;
        spawn_blocking(move || fingerprint_blocking(&path, buffer_size))
            .await
            .map_err(|e| {
                SyncError::Internal(format!("fingerprint task failed: {e}"))
            })?
    }
}

fn fingerprint_blocking(path: &Path, buffer_size: usize) -> Result<Fingerprint> {
    let mut file = File::open(path).map_err(|e| SyncError::unreadable(path, e))?;
    let before = file.metadata().map_err(|e| SyncError::unreadable(path, e))?;
    if !before.is_file() {
        return Err(SyncError::unreadable(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    let before = stat_of(&before).map_err(|e| SyncError::unreadable(path, e))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size.max(4096)];
    let mut hashed: u64 = 0;
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SyncError::unreadable(path, e)),
        };
        hasher.update(&buffer[..read]);
        hashed += read as u64;
    }

    let after = fs::metadata(path)
        .and_then(|meta| stat_of(&meta))
        .map_err(|e| SyncError::unreadable(path, e))?;
    if after != before || hashed != before.size_bytes {
        return Err(unstable(path));
    }

    let identity = PhotoIdentity::try_from(hex::encode(hasher.finalize()))
        .map_err(|e| SyncError::Internal(e.to_string()))?;

    Ok(Fingerprint {
        identity,
        size_bytes: before.size_bytes,
        mtime: before.mtime,
    })
}

fn unstable(path: &Path) -> SyncError {
    SyncError::UnreadableFile {
        path: PathBuf::from(path),
        source: io::Error::other("file changed while it was being hashed"),
    }
}

/// Stat tuple for file metadata, with mtime truncated to microseconds so it
/// survives a round trip through the catalog unchanged.
pub fn stat_of(meta: &Metadata) -> io::Result<StatTuple> {
    Ok(StatTuple {
        size_bytes: meta.len(),
        mtime: mtime_from_system(meta.modified()?),
    })
}

pub fn mtime_from_system(time: SystemTime) -> DateTime<Utc> {
    let precise = DateTime::<Utc>::from(time);
    DateTime::from_timestamp_micros(precise.timestamp_micros()).unwrap_or(precise)
}
