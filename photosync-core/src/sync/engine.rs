//! The single writer to the catalog.
//!
//! Sweeps and watch batches both funnel every path through
//! [`ReconciliationEngine::reconcile_path`], so the first sync and steady
//! state share one decision procedure. Decisions for one path are serialized
//! by [`PathLocks`]; unrelated paths run concurrently up to
//! [`EngineConfig::max_concurrency`].

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use photosync_model::{
    ChangeEvent, ObservedFile, PhotoIdentity, PhotoMetadata, PhotoRecord, PhotoStatus,
    StatTuple, SyncStats,
};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::config::EngineConfig;
use super::locks::PathLocks;
use super::state::{SyncEntry, SyncState};
use crate::assets::DerivedAssetStore;
use crate::catalog::CatalogRepository;
use crate::error::{Result, SyncError, SyncErrorKind};
use crate::fingerprint::{ContentFingerprinter, Fingerprint};
use crate::metadata::MetadataExtractor;
use crate::naming::{category_of, filename_of, is_beneath, relative_key, title_from_filename};
use crate::scan::TreeScanner;
use crate::thumbnails::ThumbnailGenerator;

/// Terminal action taken for one path in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathOutcome {
    Added,
    Updated,
    Moved,
    Removed,
    Unchanged,
    Skipped,
    Failed,
}

impl PathOutcome {
    fn tally(self, stats: &mut SyncStats) {
        match self {
            PathOutcome::Added => stats.added += 1,
            PathOutcome::Updated => stats.updated += 1,
            PathOutcome::Moved => stats.moved += 1,
            PathOutcome::Removed => stats.removed += 1,
            PathOutcome::Unchanged => stats.unchanged += 1,
            PathOutcome::Skipped => stats.skipped += 1,
            PathOutcome::Failed => stats.errors += 1,
        }
    }
}

/// Where a record should live after a write, and with which stat facts.
struct Placement<'a> {
    relative_path: &'a str,
    category: &'a str,
    stat: StatTuple,
    metadata: Option<&'a PhotoMetadata>,
    now: DateTime<Utc>,
}

impl Placement<'_> {
    fn apply(&self, record: &mut PhotoRecord) {
        let filename = filename_of(self.relative_path);
        // Titles edited outside the engine survive renames.
        let derived_title =
            record.title.is_empty() || record.title == title_from_filename(&record.filename);
        record.relative_path = self.relative_path.to_string();
        record.category = self.category.to_string();
        record.filename = filename.to_string();
        if derived_title {
            record.title = title_from_filename(filename);
        }
        record.size_bytes = self.stat.size_bytes;
        record.mtime = self.stat.mtime;
        record.status = PhotoStatus::Active;
        record.last_synced_at = self.now;
        if let Some(metadata) = self.metadata {
            record.apply_metadata(metadata);
        }
    }
}

pub struct ReconciliationEngine {
    root: PathBuf,
    catalog: Arc<dyn CatalogRepository>,
    fingerprinter: ContentFingerprinter,
    extractor: MetadataExtractor,
    thumbnails: ThumbnailGenerator,
    scanner: TreeScanner,
    config: EngineConfig,
    state: SyncState,
    locks: PathLocks,
    /// Stat tuple at which a path last failed to decode.
    rejected: DashMap<String, StatTuple>,
    /// Root-level files already reported, so the warning fires once per path.
    root_level_warned: DashSet<String>,
    /// Files a running pass saw changed and has not reconciled yet.
    pending: DashMap<String, StatTuple>,
    /// Identities tombstoned while their bytes wait at a pending path, keyed
    /// to that path. Asset cleanup is held back until the pass ends.
    relocating: DashMap<PhotoIdentity, String>,
    sweep_gate: Mutex<()>,
    cleanup: TaskTracker,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("tracked_paths", &self.state.len())
            .field("rejected_paths", &self.rejected.len())
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    pub fn new(
        root: impl Into<PathBuf>,
        catalog: Arc<dyn CatalogRepository>,
        assets: Arc<dyn DerivedAssetStore>,
        scanner: TreeScanner,
        config: EngineConfig,
    ) -> Self {
        Self {
            root: root.into(),
            catalog,
            fingerprinter: ContentFingerprinter::new(),
            extractor: MetadataExtractor::new(),
            thumbnails: ThumbnailGenerator::new(assets),
            scanner,
            config,
            state: SyncState::new(),
            locks: PathLocks::new(),
            rejected: DashMap::new(),
            root_level_warned: DashSet::new(),
            pending: DashMap::new(),
            relocating: DashMap::new(),
            sweep_gate: Mutex::new(()),
            cleanup: TaskTracker::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Paths currently remembered as failing to decode.
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    /// Rebuild [`SyncState`] from the catalog's active records.
    pub async fn seed(&self) -> Result<usize> {
        let records = self.catalog.list_active_records(None).await?;
        let seeded = self.state.seed(records.iter());
        self.rejected.clear();
        info!(records = seeded, "seeded sync state from catalog");
        Ok(seeded)
    }

    /// Wait for scheduled derived-asset cleanup to finish.
    pub async fn wait_for_cleanup(&self) {
        self.cleanup.close();
        self.cleanup.wait().await;
        self.cleanup.reopen();
    }

    /// One full walk of the tree reconciled against [`SyncState`].
    ///
    /// Returns `Ok(None)` without doing anything when another sweep is
    /// already in flight.
    pub async fn sweep(self: &Arc<Self>) -> Result<Option<SyncStats>> {
        let Ok(_gate) = self.sweep_gate.try_lock() else {
            debug!("sweep already running; skipping");
            return Ok(None);
        };

        let started = Instant::now();
        self.ensure_root().await?;

        let mut stats = SyncStats::default();
        let mut seen = HashSet::new();
        let mut observed = Vec::new();

        let (mut rx, walker) = self.scanner.spawn_walk(&self.root, self.config.walk_buffer);
        while let Some(file) = rx.recv().await {
            seen.insert(file.relative_path.clone());
            observed.push(file);
        }
        walker
            .await
            .map_err(|e| SyncError::Internal(format!("tree walk task failed: {e}")))?;
        stats.files_scanned = observed.len() as u64;
        self.register_pending(&observed);

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for file in observed {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Internal(format!("sweep semaphore closed: {e}")))?;
            let engine = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = permit;
                let rel = file.relative_path.clone();
                engine.reconcile_path(&rel, Some(file)).await
            });

            while let Some(done) = tasks.try_join_next() {
                tally_join(done, &mut stats);
            }
        }
        while let Some(done) = tasks.join_next().await {
            tally_join(done, &mut stats);
        }

        let missing: Vec<String> = self
            .state
            .paths()
            .into_iter()
            .filter(|path| !seen.contains(path))
            .collect();
        let missing_stats = self.reconcile_all(missing).await;
        stats.merge(&missing_stats);

        self.rejected.retain(|rel, _| seen.contains(rel));
        self.root_level_warned.retain(|rel| seen.contains(rel));
        self.settle_relocations(|rel| seen.contains(rel));

        stats.duration = started.elapsed();
        info!(
            scanned = stats.files_scanned,
            added = stats.added,
            updated = stats.updated,
            moved = stats.moved,
            removed = stats.removed,
            unchanged = stats.unchanged,
            skipped = stats.skipped,
            errors = stats.errors,
            duration_ms = stats.duration.as_millis() as u64,
            "sweep complete"
        );
        Ok(Some(stats))
    }

    /// Apply one coalesced batch of watch events.
    ///
    /// Every touched path is re-statted: whatever is on disk now decides
    /// between the present and missing branches. Directories expand to the
    /// files beneath them. Present paths run before missing ones so a rename
    /// lands as a move rather than a removal followed by a re-admission.
    pub async fn apply_events(self: &Arc<Self>, events: Vec<ChangeEvent>) -> SyncStats {
        let started = Instant::now();
        let mut stats = SyncStats::default();
        let mut visited = HashSet::new();
        let mut present = Vec::new();
        let mut missing = Vec::new();

        let mut paths = Vec::new();
        for event in &events {
            for path in event.paths() {
                if !paths.contains(path) {
                    paths.push(path.clone());
                }
            }
        }

        for path in paths {
            let Some(rel) = relative_key(&self.root, &path) else {
                continue;
            };
            match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) if meta.is_dir() => {
                    let walked = self.expand_directory(&rel, &path).await;
                    for file in walked {
                        if visited.insert(file.relative_path.clone()) {
                            present.push(file);
                        }
                    }
                    for gone in self.state.paths_beneath(&rel) {
                        if !visited.contains(&gone) {
                            missing.push(gone);
                        }
                    }
                }
                Ok(_) => match self.scanner.observe(&self.root, &path).await {
                    Ok(Some(file)) => {
                        if visited.insert(rel) {
                            present.push(file);
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(path = %rel, error = %err, "stat failed for watch event; skipping");
                        stats.skipped += 1;
                    }
                },
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    self.forget_vanished(&rel);
                    if self.state.get(&rel).is_some() {
                        missing.push(rel.clone());
                    }
                    missing.extend(self.state.paths_beneath(&rel));
                }
                Err(err) => {
                    warn!(path = %rel, error = %err, "stat failed for watch event; skipping");
                    stats.skipped += 1;
                }
            }
        }

        stats.files_scanned = present.len() as u64;
        self.register_pending(&present);
        let present_stats = self.reconcile_all(present).await;
        stats.merge(&present_stats);

        missing.retain(|rel| !visited.contains(rel));
        missing.sort();
        missing.dedup();
        let missing_stats = self.reconcile_all(missing).await;
        stats.merge(&missing_stats);
        self.settle_relocations(|rel| visited.contains(rel));

        stats.duration = started.elapsed();
        info!(
            events = events.len(),
            added = stats.added,
            updated = stats.updated,
            moved = stats.moved,
            removed = stats.removed,
            unchanged = stats.unchanged,
            skipped = stats.skipped,
            errors = stats.errors,
            duration_ms = stats.duration.as_millis() as u64,
            "event batch applied"
        );
        stats
    }

    /// The per-path decision. `observed` carries fresh stat facts when the
    /// caller just saw the file; without it the path is re-statted and
    /// treated as missing when nothing is there.
    ///
    /// Never fails: per-path errors are logged with their kind and folded
    /// into [`PathOutcome::Skipped`] or [`PathOutcome::Failed`].
    pub async fn reconcile_path(
        &self,
        relative_path: &str,
        observed: Option<ObservedFile>,
    ) -> PathOutcome {
        let _lease = self.locks.acquire(relative_path).await;

        let result = match observed {
            Some(file) => self.reconcile_present(&file).await,
            None => {
                let path = self.root.join(relative_path);
                match self.scanner.observe(&self.root, &path).await {
                    Ok(Some(file)) => self.reconcile_present(&file).await,
                    Ok(None) => self.reconcile_missing(relative_path).await,
                    Err(err) => Err(SyncError::unreadable(path, err)),
                }
            }
        };

        let outcome = settle(relative_path, result);
        self.pending.remove(relative_path);
        outcome
    }

    async fn reconcile_all<T>(&self, items: Vec<T>) -> SyncStats
    where
        T: ReconcileInput,
    {
        let mut stats = SyncStats::default();
        if items.is_empty() {
            return stats;
        }

        let limit = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let outcomes = futures::future::join_all(items.into_iter().map(|item| {
            let limit = Arc::clone(&limit);
            async move {
                let _permit = limit.acquire_owned().await.ok()?;
                let (rel, observed) = item.into_parts();
                Some(self.reconcile_path(&rel, observed).await)
            }
        }))
        .await;

        for outcome in outcomes {
            outcome.unwrap_or(PathOutcome::Failed).tally(&mut stats);
        }
        stats
    }

    async fn expand_directory(&self, rel: &str, dir: &Path) -> Vec<ObservedFile> {
        let scanner = self.scanner.clone();
        let root = self.root.clone();
        let dir = dir.to_path_buf();
        match tokio::task::spawn_blocking(move || scanner.scan_within(&root, &dir).collect::<Vec<_>>())
            .await
        {
            Ok(files) => files,
            Err(err) => {
                error!(path = %rel, error = %err, "directory walk task failed");
                Vec::new()
            }
        }
    }

    async fn ensure_root(&self) -> Result<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(SyncError::Configuration(format!(
                "watched root {} is not a directory",
                self.root.display()
            ))),
            Err(err) => Err(SyncError::Io(io::Error::new(
                err.kind(),
                format!("watched root {} is not accessible: {err}", self.root.display()),
            ))),
        }
    }

    async fn reconcile_present(&self, file: &ObservedFile) -> Result<PathOutcome> {
        let rel = file.relative_path.as_str();
        let Some(category) = category_of(rel) else {
            if self.root_level_warned.insert(rel.to_string()) {
                warn!(
                    path = %rel,
                    "file sits directly under the watched root; it needs a category directory and will not be cataloged"
                );
            }
            return Ok(PathOutcome::Skipped);
        };

        let stat = file.stat();
        let previous = self.state.get(rel);
        if previous.as_ref().is_some_and(|entry| entry.stat() == stat) {
            return Ok(PathOutcome::Unchanged);
        }
        if self.rejected.get(rel).is_some_and(|rejected| *rejected == stat) {
            return Ok(PathOutcome::Skipped);
        }

        let fingerprint = self.fingerprinter.fingerprint(&file.path).await?;
        let identity = fingerprint.identity.clone();
        let now = Utc::now();
        let existing = self.catalog.find_by_identity(&identity).await?;

        let outcome = match existing {
            // Same bytes already cataloged here: only the stat facts moved.
            Some(record) if record.is_active() && record.relative_path == rel => {
                if record.size_bytes == fingerprint.size_bytes && record.mtime == fingerprint.mtime
                {
                    PathOutcome::Unchanged
                } else {
                    let placement = Placement {
                        relative_path: rel,
                        category,
                        stat: fingerprint.stat(),
                        metadata: None,
                        now,
                    };
                    self.write_record(record, &placement).await?;
                    PathOutcome::Updated
                }
            }
            Some(record) if record.is_active() => {
                self.place_existing(rel, category, &fingerprint, previous.as_ref(), record, now)
                    .await?
            }
            existing => {
                let metadata = match self.extractor.extract(&file.path).await {
                    Ok(metadata) => metadata,
                    Err(err @ SyncError::InvalidImage { .. }) => {
                        warn!(
                            path = %rel,
                            kind = %err.kind(),
                            error = %err,
                            "file does not decode as an image; leaving catalog untouched"
                        );
                        self.rejected.insert(rel.to_string(), fingerprint.stat());
                        return Ok(PathOutcome::Skipped);
                    }
                    Err(err) => return Err(err),
                };

                if let Some(previous) = previous.as_ref().filter(|p| p.identity != identity) {
                    self.release_identity(rel, &previous.identity).await?;
                }

                let placement = Placement {
                    relative_path: rel,
                    category,
                    stat: fingerprint.stat(),
                    metadata: Some(&metadata),
                    now,
                };
                let reclaimed = existing.as_ref().is_some_and(|r| !r.is_active())
                    && self.relocating.contains_key(&identity);
                let base = existing.unwrap_or_else(|| blank_record(&identity, now));
                let Some(stored) = self.admit_record(base, &placement).await? else {
                    debug!(
                        path = %rel,
                        identity = %identity.short(),
                        "same content admitted at another path concurrently; tracking as alias"
                    );
                    self.state
                        .insert(rel, SyncEntry::new(fingerprint.stat(), identity));
                    self.rejected.remove(rel);
                    return Ok(PathOutcome::Unchanged);
                };
                debug!(
                    path = %rel,
                    identity = %identity.short(),
                    revision = stored.revision,
                    "admitted photo"
                );

                if reclaimed && self.relocating.remove(&identity).is_some() {
                    info!(to = %rel, identity = %identity.short(), "relocated photo reclaimed");
                    PathOutcome::Moved
                } else {
                    if let Err(err) = self
                        .thumbnails
                        .generate(&identity, &file.path, &self.config.thumbnail_sizes)
                        .await
                    {
                        warn!(
                            path = %rel,
                            identity = %identity.short(),
                            kind = %err.kind(),
                            error = %err,
                            "thumbnail generation failed; record kept"
                        );
                    }
                    PathOutcome::Added
                }
            }
        };

        self.state
            .insert(rel, SyncEntry::new(fingerprint.stat(), identity));
        self.rejected.remove(rel);
        Ok(outcome)
    }

    /// `record` is active at another path. Either this file is a second copy
    /// of the same bytes, or the file moved here.
    async fn place_existing(
        &self,
        rel: &str,
        category: &str,
        fingerprint: &Fingerprint,
        previous: Option<&SyncEntry>,
        record: PhotoRecord,
        now: DateTime<Utc>,
    ) -> Result<PathOutcome> {
        let identity = &fingerprint.identity;
        let other = record.relative_path.clone();

        if self.still_carries(&other, identity).await {
            debug!(
                path = %rel,
                canonical = %other,
                identity = %identity.short(),
                "duplicate content; tracking as alias"
            );
            return match previous.filter(|p| p.identity != *identity) {
                Some(previous) => self.release_identity(rel, &previous.identity).await,
                None => Ok(PathOutcome::Unchanged),
            };
        }

        if let Some(previous) = previous.filter(|p| p.identity != *identity) {
            self.release_identity(rel, &previous.identity).await?;
        }

        let placement = Placement {
            relative_path: rel,
            category,
            stat: fingerprint.stat(),
            metadata: None,
            now,
        };
        self.write_record(record, &placement).await?;
        self.state.remove_if_identity(&other, identity);
        info!(from = %other, to = %rel, identity = %identity.short(), "photo moved");
        Ok(PathOutcome::Moved)
    }

    /// The path no longer carries `identity`. Hand its record to another
    /// live path with the same bytes, or retire it.
    async fn release_identity(&self, rel: &str, identity: &PhotoIdentity) -> Result<PathOutcome> {
        let Some(record) = self.catalog.find_by_identity(identity).await? else {
            return Ok(PathOutcome::Unchanged);
        };
        if !record.is_active() || record.relative_path != rel {
            return Ok(PathOutcome::Unchanged);
        }

        if let Some(alias) = self.live_alias(identity, rel).await {
            let Some(category) = category_of(&alias.relative_path) else {
                return self.retire(identity, rel).await;
            };
            let placement = Placement {
                relative_path: &alias.relative_path,
                category,
                stat: alias.stat(),
                metadata: None,
                now: Utc::now(),
            };
            self.write_record(record, &placement).await?;
            info!(
                from = %rel,
                to = %alias.relative_path,
                identity = %identity.short(),
                "photo handed to duplicate copy"
            );
            return Ok(PathOutcome::Moved);
        }

        if let Some(target) = self.pending_copy(identity, rel, record.size_bytes).await {
            self.relocating.insert(identity.clone(), target.clone());
            if let Err(err) = self.catalog.mark_removed(identity).await {
                self.relocating.remove(identity);
                return Err(err);
            }
            info!(
                from = %rel,
                to = %target,
                identity = %identity.short(),
                "photo relocating to a path not yet reconciled"
            );
            return Ok(PathOutcome::Moved);
        }

        self.retire(identity, rel).await
    }

    async fn retire(&self, identity: &PhotoIdentity, rel: &str) -> Result<PathOutcome> {
        self.catalog.mark_removed(identity).await?;
        info!(path = %rel, identity = %identity.short(), "photo removed");
        self.schedule_asset_cleanup(identity.clone());
        Ok(PathOutcome::Removed)
    }

    async fn reconcile_missing(&self, rel: &str) -> Result<PathOutcome> {
        self.rejected.remove(rel);
        let Some(entry) = self.state.get(rel) else {
            return Ok(PathOutcome::Unchanged);
        };

        let outcome = self.release_identity(rel, &entry.identity).await?;
        self.state.remove_if_identity(rel, &entry.identity);
        Ok(outcome)
    }

    /// Another tracked path carrying `identity` whose file is still there
    /// and unchanged.
    async fn live_alias(&self, identity: &PhotoIdentity, exclude: &str) -> Option<ObservedFile> {
        for candidate in self.state.paths_for(identity) {
            if candidate == exclude {
                continue;
            }
            let Some(entry) = self.state.get(&candidate) else {
                continue;
            };
            let path = self.root.join(&candidate);
            if let Ok(Some(file)) = self.scanner.observe(&self.root, &path).await
                && file.stat() == entry.stat()
            {
                return Some(file);
            }
        }
        None
    }

    /// `rel` is tracked with `identity` and its file has not changed since.
    async fn still_carries(&self, rel: &str, identity: &PhotoIdentity) -> bool {
        let Some(entry) = self.state.get(rel).filter(|e| e.identity == *identity) else {
            return false;
        };
        matches!(
            self.scanner.observe(&self.root, &self.root.join(rel)).await,
            Ok(Some(file)) if file.stat() == entry.stat()
        )
    }

    /// A file this pass has not reconciled yet that holds `identity`'s bytes.
    /// Only same-size candidates are hashed.
    async fn pending_copy(
        &self,
        identity: &PhotoIdentity,
        exclude: &str,
        size_bytes: u64,
    ) -> Option<String> {
        let candidates: Vec<String> = self
            .pending
            .iter()
            .filter(|e| e.key() != exclude && e.value().size_bytes == size_bytes)
            .map(|e| e.key().clone())
            .collect();
        for candidate in candidates {
            match self.fingerprinter.fingerprint(&self.root.join(&candidate)).await {
                Ok(found) if found.identity == *identity => return Some(candidate),
                Ok(_) => {}
                Err(err) => {
                    debug!(path = %candidate, error = %err, "pending file not hashable");
                }
            }
        }
        None
    }

    fn register_pending(&self, files: &[ObservedFile]) {
        for file in files {
            let stat = file.stat();
            let known = self
                .state
                .get(&file.relative_path)
                .is_some_and(|entry| entry.stat() == stat);
            if !known {
                self.pending.insert(file.relative_path.clone(), stat);
            }
        }
    }

    /// Drop per-path negative caches for `rel` and everything beneath it.
    fn forget_vanished(&self, rel: &str) {
        self.rejected
            .retain(|path, _| path != rel && !is_beneath(path, rel));
        self.root_level_warned
            .retain(|path| path != rel && !is_beneath(path, rel));
    }

    /// Release held-back asset cleanup for relocations whose target this
    /// pass finished without reclaiming.
    fn settle_relocations(&self, finished: impl Fn(&str) -> bool) {
        let unclaimed: Vec<PhotoIdentity> = self
            .relocating
            .iter()
            .filter(|e| finished(e.value().as_str()) && !self.pending.contains_key(e.value()))
            .map(|e| e.key().clone())
            .collect();
        for identity in unclaimed {
            if self.relocating.remove(&identity).is_some() {
                debug!(identity = %identity.short(), "relocation target not reclaimed");
                self.schedule_asset_cleanup(identity);
            }
        }
    }

    async fn file_exists(&self, rel: &str) -> bool {
        matches!(
            self.scanner.observe(&self.root, &self.root.join(rel)).await,
            Ok(Some(_))
        )
    }

    /// Upsert with one refetch-and-reapply on a revision conflict.
    async fn write_record(&self, base: PhotoRecord, placement: &Placement<'_>) -> Result<PhotoRecord> {
        let mut candidate = base;
        placement.apply(&mut candidate);

        match self.catalog.upsert(&candidate).await {
            Err(SyncError::Conflict { identity }) => {
                debug!(
                    identity = %identity.short(),
                    "catalog conflict; refetching and retrying once"
                );
                let fresh = self.catalog.find_by_identity(&identity).await?;
                let revived = fresh.as_ref().is_none_or(|r| !r.is_active());
                let mut retry = fresh.unwrap_or_else(|| blank_record(&identity, placement.now));
                placement.apply(&mut retry);
                let stored = self.catalog.upsert(&retry).await?;
                if revived {
                    self.restore_assets(&identity, placement.relative_path).await;
                }
                Ok(stored)
            }
            other => other,
        }
    }

    /// The retried write revived a tombstoned record. Unless the tombstone
    /// was a held relocation, its derived assets may already be gone.
    async fn restore_assets(&self, identity: &PhotoIdentity, rel: &str) {
        if self.relocating.remove(identity).is_some() {
            return;
        }
        if let Err(err) = self
            .thumbnails
            .generate(identity, &self.root.join(rel), &self.config.thumbnail_sizes)
            .await
        {
            warn!(
                path = %rel,
                identity = %identity.short(),
                kind = %err.kind(),
                error = %err,
                "thumbnail regeneration failed for revived photo"
            );
        }
    }

    /// First write for a newly admitted file. A conflict that turns out to be
    /// the same identity admitted at another live path leaves that record
    /// alone and yields `None`.
    async fn admit_record(
        &self,
        base: PhotoRecord,
        placement: &Placement<'_>,
    ) -> Result<Option<PhotoRecord>> {
        let mut candidate = base;
        placement.apply(&mut candidate);

        let identity = match self.catalog.upsert(&candidate).await {
            Err(SyncError::Conflict { identity }) => identity,
            other => return other.map(Some),
        };
        let fresh = self.catalog.find_by_identity(&identity).await?;
        if let Some(held) = fresh.as_ref()
            && held.is_active()
            && held.relative_path != placement.relative_path
            && self.file_exists(&held.relative_path).await
        {
            return Ok(None);
        }

        debug!(
            identity = %identity.short(),
            "catalog conflict on admission; retrying once"
        );
        let mut retry = fresh.unwrap_or_else(|| blank_record(&identity, placement.now));
        placement.apply(&mut retry);
        self.catalog.upsert(&retry).await.map(Some)
    }

    fn schedule_asset_cleanup(&self, identity: PhotoIdentity) {
        let store = Arc::clone(self.thumbnails.store());
        let catalog = Arc::clone(&self.catalog);
        self.cleanup.spawn(async move {
            match catalog.find_by_identity(&identity).await {
                Ok(Some(record)) if record.is_active() => {
                    debug!(identity = %identity.short(), "photo active again; keeping derived assets");
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        identity = %identity.short(),
                        error = %err,
                        "could not confirm removal; keeping derived assets"
                    );
                    return;
                }
            }
            if let Err(err) = store.delete_all(&identity).await {
                warn!(
                    identity = %identity.short(),
                    error = %err,
                    "derived asset cleanup failed"
                );
            }
        });
    }
}

/// Inputs accepted by the bounded fan-out: an observed file, or a bare path
/// that still has to be looked at.
trait ReconcileInput: Send {
    fn into_parts(self) -> (String, Option<ObservedFile>);
}

impl ReconcileInput for ObservedFile {
    fn into_parts(self) -> (String, Option<ObservedFile>) {
        (self.relative_path.clone(), Some(self))
    }
}

impl ReconcileInput for String {
    fn into_parts(self) -> (String, Option<ObservedFile>) {
        (self, None)
    }
}

fn blank_record(identity: &PhotoIdentity, now: DateTime<Utc>) -> PhotoRecord {
    PhotoRecord {
        identity: identity.clone(),
        relative_path: String::new(),
        category: String::new(),
        filename: String::new(),
        title: String::new(),
        size_bytes: 0,
        mtime: now,
        width: 0,
        height: 0,
        orientation: 1,
        capture_metadata: None,
        status: PhotoStatus::Active,
        last_synced_at: now,
        revision: 0,
    }
}

fn settle(rel: &str, result: Result<PathOutcome>) -> PathOutcome {
    let err = match result {
        Ok(outcome) => return outcome,
        Err(err) => err,
    };
    match err.kind() {
        SyncErrorKind::UnreadableFile => {
            warn!(path = %rel, kind = %err.kind(), error = %err, "skipping file for this pass");
            PathOutcome::Skipped
        }
        SyncErrorKind::Conflict => {
            warn!(path = %rel, kind = %err.kind(), error = %err, "catalog conflict persisted after retry; skipping");
            PathOutcome::Skipped
        }
        kind => {
            error!(path = %rel, kind = %kind, error = %err, "reconciliation failed");
            PathOutcome::Failed
        }
    }
}

fn tally_join(
    done: std::result::Result<PathOutcome, tokio::task::JoinError>,
    stats: &mut SyncStats,
) {
    match done {
        Ok(outcome) => outcome.tally(stats),
        Err(err) => {
            error!(error = %err, "reconcile task failed");
            stats.errors += 1;
        }
    }
}
