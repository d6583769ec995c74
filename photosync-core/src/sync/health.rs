use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use photosync_model::SyncStats;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// No full sweep has completed yet.
    Starting,
    /// Live watching is unavailable; periodic sweeps still run.
    Degraded,
    /// The periodic sweep task is gone or the catalog is unreachable.
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub ready: bool,
    pub uptime_seconds: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub watcher_active: bool,
    pub watcher_degraded: bool,
    pub timer_active: bool,
    pub database_connected: bool,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub last_sync: Option<DateTime<Utc>>,
    pub last_full_sync: Option<DateTime<Utc>>,
    pub last_sweep: Option<SyncStats>,
    pub sweeps_completed: u64,
    pub events_processed: u64,
    pub events_failed: u64,
    pub files_added: u64,
    pub files_updated: u64,
    pub files_moved: u64,
    pub files_removed: u64,
    pub average_sweep_ms: u64,
}

/// Shared liveness, readiness and counters written by the coordinator and
/// read by the health endpoint.
#[derive(Debug)]
pub struct SyncHealth {
    started_at: Instant,
    ready: AtomicBool,
    watcher_alive: AtomicBool,
    watcher_degraded: AtomicBool,
    timer_alive: AtomicBool,
    database_connected: AtomicBool,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    last_full_sync: RwLock<Option<DateTime<Utc>>>,
    last_sweep: RwLock<Option<SyncStats>>,
    sweeps_completed: AtomicU64,
    total_sweep_ms: AtomicU64,
    events_processed: AtomicU64,
    events_failed: AtomicU64,
    files_added: AtomicU64,
    files_updated: AtomicU64,
    files_moved: AtomicU64,
    files_removed: AtomicU64,
}

impl Default for SyncHealth {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            ready: AtomicBool::new(false),
            watcher_alive: AtomicBool::new(false),
            watcher_degraded: AtomicBool::new(false),
            timer_alive: AtomicBool::new(false),
            database_connected: AtomicBool::new(true),
            last_sync: RwLock::new(None),
            last_full_sync: RwLock::new(None),
            last_sweep: RwLock::new(None),
            sweeps_completed: AtomicU64::new(0),
            total_sweep_ms: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            files_added: AtomicU64::new(0),
            files_updated: AtomicU64::new(0),
            files_moved: AtomicU64::new(0),
            files_removed: AtomicU64::new(0),
        }
    }
}

impl SyncHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_watcher_alive(&self, alive: bool) {
        self.watcher_alive.store(alive, Ordering::Release);
    }

    pub fn set_watcher_degraded(&self, degraded: bool) {
        self.watcher_degraded.store(degraded, Ordering::Release);
    }

    pub fn set_timer_alive(&self, alive: bool) {
        self.timer_alive.store(alive, Ordering::Release);
    }

    /// Outcome of the latest catalog connectivity check.
    pub fn set_database_connected(&self, connected: bool) {
        self.database_connected.store(connected, Ordering::Release);
    }

    pub fn database_connected(&self) -> bool {
        self.database_connected.load(Ordering::Acquire)
    }

    pub fn watcher_alive(&self) -> bool {
        self.watcher_alive.load(Ordering::Acquire)
    }

    pub fn watcher_degraded(&self) -> bool {
        self.watcher_degraded.load(Ordering::Acquire)
    }

    pub fn timer_alive(&self) -> bool {
        self.timer_alive.load(Ordering::Acquire)
    }

    /// A completed full sweep. The first one flips readiness.
    pub fn record_sweep(&self, stats: &SyncStats) {
        let now = Utc::now();
        *self.last_sync.write() = Some(now);
        *self.last_full_sync.write() = Some(now);
        *self.last_sweep.write() = Some(stats.clone());
        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
        self.total_sweep_ms
            .fetch_add(stats.duration.as_millis() as u64, Ordering::Relaxed);
        self.add_changes(stats);
        self.ready.store(true, Ordering::Release);
    }

    /// A processed watch batch of `events` change events.
    pub fn record_batch(&self, events: usize, stats: &SyncStats) {
        *self.last_sync.write() = Some(Utc::now());
        self.events_processed
            .fetch_add(events as u64, Ordering::Relaxed);
        self.events_failed.fetch_add(stats.errors, Ordering::Relaxed);
        self.add_changes(stats);
    }

    fn add_changes(&self, stats: &SyncStats) {
        self.files_added.fetch_add(stats.added, Ordering::Relaxed);
        self.files_updated.fetch_add(stats.updated, Ordering::Relaxed);
        self.files_moved.fetch_add(stats.moved, Ordering::Relaxed);
        self.files_removed.fetch_add(stats.removed, Ordering::Relaxed);
    }

    pub fn status(&self) -> HealthStatus {
        if !self.database_connected() {
            HealthStatus::Unhealthy
        } else if !self.is_ready() {
            HealthStatus::Starting
        } else if !self.timer_alive() {
            HealthStatus::Unhealthy
        } else if !self.watcher_alive() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: self.status(),
            ready: self.is_ready(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            last_sync: *self.last_sync.read(),
            watcher_active: self.watcher_alive(),
            watcher_degraded: self.watcher_degraded(),
            timer_active: self.timer_alive(),
            database_connected: self.database_connected(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn stats(&self) -> StatsReport {
        let sweeps = self.sweeps_completed.load(Ordering::Relaxed);
        let total_ms = self.total_sweep_ms.load(Ordering::Relaxed);
        StatsReport {
            last_sync: *self.last_sync.read(),
            last_full_sync: *self.last_full_sync.read(),
            last_sweep: self.last_sweep.read().clone(),
            sweeps_completed: sweeps,
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            files_added: self.files_added.load(Ordering::Relaxed),
            files_updated: self.files_updated.load(Ordering::Relaxed),
            files_moved: self.files_moved.load(Ordering::Relaxed),
            files_removed: self.files_removed.load(Ordering::Relaxed),
            average_sweep_ms: total_ms.checked_div(sweeps).unwrap_or(0),
        }
    }
}
