use std::time::Duration;

/// Outcome counters for one reconciliation pass (a sweep or an event batch).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyncStats {
    pub files_scanned: u64,
    pub added: u64,
    pub updated: u64,
    pub moved: u64,
    pub removed: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub errors: u64,
    #[cfg_attr(feature = "serde", serde(with = "duration_ms"))]
    pub duration: Duration,
}

impl SyncStats {
    /// Number of catalog-visible changes produced by the pass.
    pub fn changes(&self) -> u64 {
        self.added + self.updated + self.moved + self.removed
    }

    pub fn merge(&mut self, other: &SyncStats) {
        self.files_scanned += other.files_scanned;
        self.added += other.added;
        self.updated += other.updated;
        self.moved += other.moved;
        self.removed += other.removed;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.duration += other.duration;
    }
}

#[cfg(feature = "serde")]
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
