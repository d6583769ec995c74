use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use photosync_model::ObservedFile;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, spawn_blocking};
use tracing::{debug, warn};
use walkdir::{DirEntry, FilterEntry, WalkDir};

use super::filter::{FileFilter, is_hidden_name};
use crate::fingerprint::stat_of;
use crate::naming::relative_key;

/// Walks the watched tree and yields candidate files with their stat facts.
///
/// Each call to [`TreeScanner::scan`] is an independent walk. Symbolic links
/// are reported as links by the walker and never followed, so they are
/// neither traversed nor cataloged.
#[derive(Debug, Clone)]
pub struct TreeScanner {
    filter: Arc<FileFilter>,
}

impl TreeScanner {
    pub fn new(filter: Arc<FileFilter>) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &FileFilter {
        &self.filter
    }

    /// Lazy walk of `root`. Unreadable entries are logged and skipped.
    pub fn scan(&self, root: &Path) -> TreeWalk {
        self.scan_within(root, root)
    }

    /// Lazy walk of the subtree at `dir`, keyed relative to `root`.
    pub fn scan_within(&self, root: &Path, dir: &Path) -> TreeWalk {
        let visible: fn(&DirEntry) -> bool = is_visible_entry;
        TreeWalk {
            root: root.to_path_buf(),
            filter: Arc::clone(&self.filter),
            inner: WalkDir::new(dir)
                .follow_links(false)
                .into_iter()
                .filter_entry(visible),
        }
    }

    /// Run [`TreeScanner::scan`] on the blocking pool, forwarding files into a
    /// bounded channel. The handle resolves to the number of files sent; the
    /// walk stops early once the receiver is dropped.
    pub fn spawn_walk(
        &self,
        root: &Path,
        capacity: usize,
    ) -> (mpsc::Receiver<ObservedFile>, JoinHandle<usize>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let walk = self.scan(root);
        let handle = spawn_blocking(move || {
            let mut sent = 0usize;
            for file in walk {
                if tx.blocking_send(file).is_err() {
                    debug!("tree walk receiver dropped; stopping early");
                    break;
                }
                sent += 1;
            }
            sent
        });
        (rx, handle)
    }

    /// Stat a single absolute path. `Ok(None)` when nothing is there or the
    /// entry is not a candidate regular file.
    pub async fn observe(
        &self,
        root: &Path,
        path: &Path,
    ) -> io::Result<Option<ObservedFile>> {
        let Some(relative_path) = relative_key(root, path) else {
            return Ok(None);
        };
        if !self.filter.is_candidate(&relative_path) {
            return Ok(None);
        }

        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        if !meta.file_type().is_file() {
            return Ok(None);
        }

        let stat = stat_of(&meta)?;
        Ok(Some(ObservedFile {
            path: path.to_path_buf(),
            relative_path,
            size_bytes: stat.size_bytes,
            mtime: stat.mtime,
        }))
    }
}

/// Iterator returned by [`TreeScanner::scan`].
pub struct TreeWalk {
    root: PathBuf,
    filter: Arc<FileFilter>,
    inner: FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>,
}

impl std::fmt::Debug for TreeWalk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWalk").field("root", &self.root).finish()
    }
}

impl Iterator for TreeWalk {
    type Item = ObservedFile;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(
                        path = ?err.path(),
                        error = %err,
                        "skipping unreadable entry during tree walk"
                    );
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative_path) = relative_key(&self.root, entry.path()) else {
                continue;
            };
            if !self.filter.is_candidate(&relative_path) {
                continue;
            }

            let stat = match entry.metadata().map_err(io::Error::from).and_then(|m| stat_of(&m)) {
                Ok(stat) => stat,
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "stat failed during tree walk");
                    continue;
                }
            };

            return Some(ObservedFile {
                path: entry.into_path(),
                relative_path,
                size_bytes: stat.size_bytes,
                mtime: stat.mtime,
            });
        }
    }
}

fn is_visible_entry(entry: &DirEntry) -> bool {
    entry.depth() == 0
        || entry
            .file_name()
            .to_str()
            .is_none_or(|name| !is_hidden_name(name))
}
