use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use photosync_model::{PhotoIdentity, PhotoRecord, StatTuple};

/// Last fingerprinted facts for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
    pub size_bytes: u64,
    pub mtime: DateTime<Utc>,
    pub identity: PhotoIdentity,
}

impl SyncEntry {
    pub fn new(stat: StatTuple, identity: PhotoIdentity) -> Self {
        Self {
            size_bytes: stat.size_bytes,
            mtime: stat.mtime,
            identity,
        }
    }

    pub fn stat(&self) -> StatTuple {
        StatTuple {
            size_bytes: self.size_bytes,
            mtime: self.mtime,
        }
    }
}

/// In-memory path index used to skip re-hashing unchanged files.
///
/// Keeps a reverse index from identity to every path currently carrying it
/// so moves and duplicate copies resolve without touching the catalog.
/// Both maps shard their locking per key; callers serialize writes to a
/// single path through [`super::PathLocks`].
#[derive(Debug, Default)]
pub struct SyncState {
    entries: DashMap<String, SyncEntry>,
    by_identity: DashMap<PhotoIdentity, BTreeSet<String>>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with the given active records.
    pub fn seed<'a>(&self, records: impl IntoIterator<Item = &'a PhotoRecord>) -> usize {
        self.entries.clear();
        self.by_identity.clear();
        for record in records.into_iter().filter(|r| r.is_active()) {
            self.insert(
                &record.relative_path,
                SyncEntry {
                    size_bytes: record.size_bytes,
                    mtime: record.mtime,
                    identity: record.identity.clone(),
                },
            );
        }
        self.entries.len()
    }

    pub fn get(&self, relative_path: &str) -> Option<SyncEntry> {
        self.entries.get(relative_path).map(|entry| entry.clone())
    }

    pub fn insert(&self, relative_path: &str, entry: SyncEntry) {
        let identity = entry.identity.clone();
        let previous = self.entries.insert(relative_path.to_string(), entry);
        if let Some(previous) = previous
            && previous.identity != identity
        {
            self.unlink(&previous.identity, relative_path);
        }
        self.by_identity
            .entry(identity)
            .or_default()
            .insert(relative_path.to_string());
    }

    pub fn remove(&self, relative_path: &str) -> Option<SyncEntry> {
        let (_, removed) = self.entries.remove(relative_path)?;
        self.unlink(&removed.identity, relative_path);
        Some(removed)
    }

    /// Remove `relative_path` only while it still maps to `identity`.
    pub fn remove_if_identity(&self, relative_path: &str, identity: &PhotoIdentity) -> bool {
        let removed = self
            .entries
            .remove_if(relative_path, |_, entry| entry.identity == *identity)
            .is_some();
        if removed {
            self.unlink(identity, relative_path);
        }
        removed
    }

    /// Every tracked path carrying `identity`, sorted.
    pub fn paths_for(&self, identity: &PhotoIdentity) -> Vec<String> {
        self.by_identity
            .get(identity)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Tracked paths strictly beneath the directory key `dir`.
    pub fn paths_beneath(&self, dir: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| crate::naming::is_beneath(entry.key(), dir))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unlink(&self, identity: &PhotoIdentity, relative_path: &str) {
        if let Some(mut paths) = self.by_identity.get_mut(identity) {
            paths.remove(relative_path);
        }
        self.by_identity.remove_if(identity, |_, paths| paths.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(fill: char) -> PhotoIdentity {
        fill.to_string().repeat(64).parse().unwrap()
    }

    fn entry(size: u64, fill: char) -> SyncEntry {
        SyncEntry {
            size_bytes: size,
            mtime: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            identity: identity(fill),
        }
    }

    #[test]
    fn reverse_index_follows_identity_changes() {
        let state = SyncState::new();
        state.insert("A/x.jpg", entry(1, 'a'));
        state.insert("B/x.jpg", entry(1, 'a'));
        assert_eq!(state.paths_for(&identity('a')), vec!["A/x.jpg", "B/x.jpg"]);

        state.insert("A/x.jpg", entry(2, 'b'));
        assert_eq!(state.paths_for(&identity('a')), vec!["B/x.jpg"]);
        assert_eq!(state.paths_for(&identity('b')), vec!["A/x.jpg"]);

        state.remove("B/x.jpg");
        assert!(state.paths_for(&identity('a')).is_empty());
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn conditional_remove_respects_identity() {
        let state = SyncState::new();
        state.insert("A/x.jpg", entry(1, 'a'));
        assert!(!state.remove_if_identity("A/x.jpg", &identity('b')));
        assert!(state.remove_if_identity("A/x.jpg", &identity('a')));
        assert!(state.is_empty());
        assert!(state.paths_for(&identity('a')).is_empty());
    }

    #[test]
    fn paths_beneath_matches_whole_segments() {
        let state = SyncState::new();
        state.insert("Travel/x.jpg", entry(1, 'a'));
        state.insert("Travel/2023/y.jpg", entry(1, 'b'));
        state.insert("Travelling/z.jpg", entry(1, 'c'));

        let mut beneath = state.paths_beneath("Travel");
        beneath.sort();
        assert_eq!(beneath, vec!["Travel/2023/y.jpg", "Travel/x.jpg"]);
    }
}
