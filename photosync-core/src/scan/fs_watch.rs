//! Live change notifications for the watched tree.
//!
//! A thin wrapper around `notify` that pushes raw notifications through a
//! bounded channel into a batching task. The task coalesces events per path
//! within a debounce window and hands [`WatchSignal`]s to the coordinator.
//! Provider overflow and errors are surfaced explicitly so the caller can
//! fall back to a sweep.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use photosync_model::ChangeEvent;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, spawn_blocking};
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

use super::filter::FileFilter;
use crate::error::{Result, SyncError};
use crate::naming::relative_key;

/// Configuration knobs for watch processing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FsWatchConfig {
    /// Quiet period after the last event before a batch is flushed.
    pub debounce_window: Duration,
    /// Maximum number of coalesced events handed over in one batch.
    pub max_batch_events: usize,
}

impl Default for FsWatchConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_secs(2),
            max_batch_events: 100,
        }
    }
}

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// Coalesced change events, absolute paths.
    Batch(Vec<ChangeEvent>),
    /// The provider lost track of changes (queue overflow or an explicit
    /// rescan flag). Only a sweep restores consistency.
    Rescan { reason: String },
    /// The provider reported a failure. The subscription may be dead.
    ProviderError(String),
}

/// Source of live change notifications. One subscription per call; a failed
/// subscription is dropped and a fresh one requested.
#[async_trait]
pub trait WatchProvider: Send + Sync {
    async fn subscribe(&self, root: &Path) -> Result<WatchSubscription>;
}

/// A live subscription. Dropping it stops the underlying watcher.
pub struct WatchSubscription {
    rx: mpsc::Receiver<WatchSignal>,
    watcher: Option<RecommendedWatcher>,
    batcher: Option<JoinHandle<()>>,
}

impl WatchSubscription {
    /// Wrap an arbitrary signal channel. Used by providers that do not sit on
    /// top of `notify`.
    pub fn from_receiver(rx: mpsc::Receiver<WatchSignal>) -> Self {
        Self {
            rx,
            watcher: None,
            batcher: None,
        }
    }

    /// Next signal, or `None` once the provider side has shut down.
    pub async fn next(&mut self) -> Option<WatchSignal> {
        self.rx.recv().await
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Dropping the watcher ends the notify stream.
        self.watcher.take();
        if let Some(batcher) = self.batcher.take() {
            batcher.abort();
        }
        self.rx.close();
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("has_watcher", &self.watcher.is_some())
            .field(
                "batcher_finished",
                &self.batcher.as_ref().map(JoinHandle::is_finished),
            )
            .finish()
    }
}

/// `notify`-backed [`WatchProvider`].
#[derive(Debug, Clone)]
pub struct FileWatcher {
    config: FsWatchConfig,
    filter: Arc<FileFilter>,
}

impl FileWatcher {
    pub fn new(config: FsWatchConfig, filter: Arc<FileFilter>) -> Self {
        Self { config, filter }
    }

    pub fn config(&self) -> &FsWatchConfig {
        &self.config
    }
}

#[async_trait]
impl WatchProvider for FileWatcher {
    async fn subscribe(&self, root: &Path) -> Result<WatchSubscription> {
        let root = root.to_path_buf();
        let capacity = self.config.max_batch_events.max(64) * 4;
        let (raw_tx, raw_rx) = mpsc::channel::<RawMessage>(capacity);
        let (signal_tx, signal_rx) = mpsc::channel::<WatchSignal>(16);

        let watch_root = root.clone();
        let watcher = spawn_blocking(move || init_watcher(&watch_root, raw_tx))
            .await
            .map_err(|e| {
                SyncError::WatchProvider(format!("watcher initialization panicked: {e}"))
            })??;

        let batcher = spawn_batch_loop(
            root,
            Arc::clone(&self.filter),
            self.config.clone(),
            raw_rx,
            signal_tx,
        );

        Ok(WatchSubscription {
            rx: signal_rx,
            watcher: Some(watcher),
            batcher: Some(batcher),
        })
    }
}

enum RawMessage {
    Event(Event),
    Error(String),
}

fn init_watcher(
    root: &Path,
    tx: mpsc::Sender<RawMessage>,
) -> Result<RecommendedWatcher> {
    let display_root = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            let message = match res {
                Ok(event) => RawMessage::Event(event),
                Err(err) => RawMessage::Error(err.to_string()),
            };
            if let Err(err) = tx.blocking_send(message) {
                warn!(
                    "fs_watch channel send failed for {}: {}",
                    display_root.display(),
                    err
                );
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| {
        SyncError::WatchProvider(format!(
            "failed to create watcher for {}: {}",
            root.display(),
            err
        ))
    })?;

    watcher.watch(root, RecursiveMode::Recursive).map_err(|err| {
        SyncError::WatchProvider(format!("failed to watch {}: {}", root.display(), err))
    })?;

    Ok(watcher)
}

fn spawn_batch_loop(
    root: PathBuf,
    filter: Arc<FileFilter>,
    config: FsWatchConfig,
    mut rx: mpsc::Receiver<RawMessage>,
    tx: mpsc::Sender<WatchSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending = PendingBatch::default();

        loop {
            let msg = if pending.is_empty() {
                rx.recv().await
            } else {
                match timeout(config.debounce_window, rx.recv()).await {
                    Ok(msg) => msg,
                    Err(_) => {
                        if !flush(&mut pending, &tx).await {
                            break;
                        }
                        continue;
                    }
                }
            };

            let Some(msg) = msg else {
                flush(&mut pending, &tx).await;
                break;
            };

            let signal = match msg {
                RawMessage::Event(event) => match convert_event(&root, &filter, &event) {
                    Converted::Change(change) => {
                        pending.push(change);
                        if pending.len() >= config.max_batch_events.max(1)
                            && !flush(&mut pending, &tx).await
                        {
                            break;
                        }
                        continue;
                    }
                    Converted::Rescan => WatchSignal::Rescan {
                        reason: format!("provider requested rescan ({:?})", event.kind),
                    },
                    Converted::Ignored => continue,
                },
                RawMessage::Error(error) => WatchSignal::ProviderError(error),
            };

            // Anything pending is older than the out-of-band signal.
            if !flush(&mut pending, &tx).await || tx.send(signal).await.is_err() {
                break;
            }
        }
        debug!(root = %root.display(), "watch batch loop stopped");
    })
}

async fn flush(pending: &mut PendingBatch, tx: &mpsc::Sender<WatchSignal>) -> bool {
    if pending.is_empty() {
        return true;
    }
    tx.send(WatchSignal::Batch(pending.take())).await.is_ok()
}

/// Change events coalesced by their primary path, in arrival order.
#[derive(Debug, Default)]
struct PendingBatch {
    events: Vec<ChangeEvent>,
    index: HashMap<PathBuf, usize>,
}

impl PendingBatch {
    fn push(&mut self, event: ChangeEvent) {
        let key = primary_path(&event).clone();
        match self.index.get(&key) {
            Some(&slot) => {
                let merged = merge(&self.events[slot], event);
                let superseded = std::mem::replace(&mut self.events[slot], merged);
                // A rename's source must still be looked at once the rename
                // itself is gone from the batch.
                if let ChangeEvent::Renamed { from, .. } = superseded
                    && !self.events[slot].paths().contains(&&from)
                {
                    self.push(ChangeEvent::Removed(from));
                }
            }
            None => {
                self.index.insert(key, self.events.len());
                self.events.push(event);
            }
        }
    }

    fn len(&self) -> usize {
        self.events.len()
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn take(&mut self) -> Vec<ChangeEvent> {
        self.index.clear();
        std::mem::take(&mut self.events)
    }
}

fn primary_path(event: &ChangeEvent) -> &PathBuf {
    match event {
        ChangeEvent::Created(path)
        | ChangeEvent::Modified(path)
        | ChangeEvent::Removed(path) => path,
        ChangeEvent::Renamed { to, .. } => to,
    }
}

/// Later events win, except that a modification does not hide a creation.
fn merge(earlier: &ChangeEvent, later: ChangeEvent) -> ChangeEvent {
    match (earlier, later) {
        (ChangeEvent::Created(path), ChangeEvent::Modified(_)) => {
            ChangeEvent::Created(path.clone())
        }
        (ChangeEvent::Renamed { from, to }, ChangeEvent::Modified(_)) => {
            ChangeEvent::Renamed {
                from: from.clone(),
                to: to.clone(),
            }
        }
        (_, later) => later,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Converted {
    Change(ChangeEvent),
    Rescan,
    Ignored,
}

fn convert_event(root: &Path, filter: &FileFilter, event: &Event) -> Converted {
    if event.need_rescan() || matches!(event.kind, EventKind::Other) {
        return Converted::Rescan;
    }

    let relevant = |path: &PathBuf| -> Option<PathBuf> {
        let clean = sanitize_path(root, path)?;
        let key = relative_key(root, &clean)?;
        filter.may_be_relevant(&key).then_some(clean)
    };

    let mut paths = event.paths.iter();
    let Some(first) = paths.next() else {
        return Converted::Ignored;
    };

    let change = match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let from = relevant(first);
            let to = paths.next().and_then(relevant);
            match (from, to) {
                (Some(from), Some(to)) => Some(ChangeEvent::Renamed { from, to }),
                (Some(from), None) => Some(ChangeEvent::Removed(from)),
                (None, Some(to)) => Some(ChangeEvent::Created(to)),
                (None, None) => None,
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            relevant(first).map(ChangeEvent::Removed)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            relevant(first).map(ChangeEvent::Created)
        }
        EventKind::Create(_) => relevant(first).map(ChangeEvent::Created),
        EventKind::Remove(_) => relevant(first).map(ChangeEvent::Removed),
        EventKind::Modify(_) => relevant(first).map(ChangeEvent::Modified),
        // Close-after-write is the clearest "upload finished" signal.
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            relevant(first).map(ChangeEvent::Modified)
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    };

    change.map_or(Converted::Ignored, Converted::Change)
}

fn sanitize_path(root: &Path, path: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(root).ok()?;
    let mut clean = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(seg) => clean.push(seg),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            _ => return None,
        }
    }

    let mut normalized = root.to_path_buf();
    normalized.push(clean);
    Some(normalized)
}
