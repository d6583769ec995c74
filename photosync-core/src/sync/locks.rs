use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-path critical sections. A lock entry exists only while someone holds
/// or waits for it.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `relative_path`.
    pub async fn acquire(&self, relative_path: &str) -> PathLease<'_> {
        let lock = self
            .locks
            .entry(relative_path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = Arc::clone(&lock).lock_owned().await;
        PathLease {
            locks: self,
            relative_path: relative_path.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    /// Number of paths currently held or contended.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held for the duration of one reconciliation decision.
pub struct PathLease<'a> {
    locks: &'a PathLocks,
    relative_path: String,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PathLease<'_> {
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }
}

impl fmt::Debug for PathLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathLease")
            .field("relative_path", &self.relative_path)
            .finish()
    }
}

impl Drop for PathLease<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // The map and this lease hold the only references when nobody waits.
        self.locks.locks.remove_if(&self.relative_path, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}
