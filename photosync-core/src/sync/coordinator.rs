use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use super::engine::ReconciliationEngine;
use super::health::SyncHealth;
use crate::error::{Result, SyncError};
use crate::scan::{WatchProvider, WatchSignal};

/// Owns the process lifetime of the sync engine: the startup sweep, the
/// live-watch task and the periodic backstop sweep.
pub struct SyncCoordinator {
    engine: Arc<ReconciliationEngine>,
    watcher: Arc<dyn WatchProvider>,
    health: Arc<SyncHealth>,
    config: CoordinatorConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    handles: Mutex<Vec<JoinHandle<()>>>,
    sweep_requested: Arc<Notify>,
    fatal: Arc<Mutex<Option<SyncError>>>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("config", &self.config)
            .field("tasks", &self.tracker.len())
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        watcher: Arc<dyn WatchProvider>,
        health: Arc<SyncHealth>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            engine,
            watcher,
            health,
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            handles: Mutex::new(Vec::new()),
            sweep_requested: Arc::new(Notify::new()),
            fatal: Arc::new(Mutex::new(None)),
        }
    }

    pub fn health(&self) -> &Arc<SyncHealth> {
        &self.health
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    /// Cancelled when shutdown begins, whether requested or fatal.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the timer task for an out-of-band sweep.
    pub fn request_sweep(&self) {
        self.sweep_requested.notify_one();
    }

    /// Seed state, run the startup sweep if configured, then start the
    /// watch and timer tasks.
    pub async fn start(&self) -> Result<()> {
        self.engine.seed().await?;

        if self.config.initial_sync_on_startup {
            info!("running initial full sweep");
            if let Some(stats) = self.engine.sweep().await? {
                self.health.record_sweep(&stats);
            }
            info!("initial sweep complete; ready");
        } else {
            info!("initial sweep disabled; ready after the first periodic sweep");
        }

        self.health.set_timer_alive(true);
        self.health.set_watcher_alive(true);
        let timer = self.tracker.spawn(timer_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.health),
            self.config,
            self.shutdown.clone(),
            Arc::clone(&self.sweep_requested),
        ));
        let watch = self.tracker.spawn(watch_loop(
            Arc::clone(&self.engine),
            Arc::clone(&self.watcher),
            Arc::clone(&self.health),
            self.config,
            self.shutdown.clone(),
            Arc::clone(&self.sweep_requested),
            Arc::clone(&self.fatal),
        ));
        self.handles.lock().extend([timer, watch]);
        Ok(())
    }

    /// Stop taking new work, let in-flight work finish within the drain
    /// timeout and abandon whatever is left.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();

        let drain = self.config.shutdown_drain_timeout();
        let engine = Arc::clone(&self.engine);
        let drained = timeout(drain, async {
            self.tracker.wait().await;
            engine.wait_for_cleanup().await;
        })
        .await;

        match drained {
            Ok(()) => info!("sync coordinator drained"),
            Err(_) => {
                warn!(
                    timeout_ms = drain.as_millis() as u64,
                    "drain timeout elapsed; abandoning in-flight work"
                );
                for handle in self.handles.lock().drain(..) {
                    handle.abort();
                }
            }
        }
        self.health.set_watcher_alive(false);
        self.health.set_timer_alive(false);
    }

    /// The error that forced shutdown, if any.
    pub fn take_fatal(&self) -> Option<SyncError> {
        self.fatal.lock().take()
    }
}

async fn run_sweep(engine: &Arc<ReconciliationEngine>, health: &SyncHealth, trigger: &str) {
    match engine.sweep().await {
        Ok(Some(stats)) => health.record_sweep(&stats),
        Ok(None) => debug!(trigger, "sweep skipped; one is already running"),
        Err(err) => error!(trigger, kind = %err.kind(), error = %err, "sweep failed"),
    }
}

async fn timer_loop(
    engine: Arc<ReconciliationEngine>,
    health: Arc<SyncHealth>,
    config: CoordinatorConfig,
    shutdown: CancellationToken,
    sweep_requested: Arc<Notify>,
) {
    // Periodic sweeps start one full interval after startup, whether or not a
    // startup sweep ran.
    let period = config.periodic_sync_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => run_sweep(&engine, &health, "periodic").await,
            _ = sweep_requested.notified() => {
                run_sweep(&engine, &health, "requested").await;
            }
        }
    }
    health.set_timer_alive(false);
    debug!("periodic sweep task stopped");
}

async fn watch_loop(
    engine: Arc<ReconciliationEngine>,
    watcher: Arc<dyn WatchProvider>,
    health: Arc<SyncHealth>,
    config: CoordinatorConfig,
    shutdown: CancellationToken,
    sweep_requested: Arc<Notify>,
    fatal: Arc<Mutex<Option<SyncError>>>,
) {
    let root = engine.root().to_path_buf();
    let mut failures: u32 = 0;

    loop {
        let subscribed = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = watcher.subscribe(&root) => result,
        };

        let failure = match subscribed {
            Ok(mut subscription) => {
                health.set_watcher_alive(true);
                if failures > 0 {
                    // Changes during the outage were never delivered.
                    info!("watch subscription restored; requesting a sweep");
                    sweep_requested.notify_one();
                }
                let mut delivered = false;

                let failure = loop {
                    let signal = tokio::select! {
                        _ = shutdown.cancelled() => break None,
                        signal = subscription.next() => signal,
                    };
                    match signal {
                        Some(WatchSignal::Batch(events)) => {
                            delivered = true;
                            let count = events.len();
                            let stats = engine.apply_events(events).await;
                            health.record_batch(count, &stats);
                        }
                        Some(WatchSignal::Rescan { reason }) => {
                            warn!(%reason, "watch provider lost events; requesting a sweep");
                            sweep_requested.notify_one();
                        }
                        Some(WatchSignal::ProviderError(message)) => {
                            break Some(SyncError::WatchProvider(message));
                        }
                        None => {
                            break Some(SyncError::WatchProvider(
                                "watch stream ended unexpectedly".to_string(),
                            ));
                        }
                    }
                };
                subscription.shutdown();
                if delivered {
                    failures = 0;
                }
                match failure {
                    Some(err) => err,
                    None => break,
                }
            }
            Err(err) => err,
        };

        health.set_watcher_alive(false);
        failures += 1;
        if failures > config.retry_attempts {
            degrade(&health, &shutdown, &fatal, failure);
            return;
        }

        let backoff = config.retry_backoff(failures);
        warn!(
            attempt = failures,
            max_attempts = config.retry_attempts,
            backoff_ms = backoff.as_millis() as u64,
            error = %failure,
            "watch provider failed; re-subscribing"
        );
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(backoff) => {}
        }
    }

    health.set_watcher_alive(false);
    debug!("watch task stopped");
}

/// Re-subscription budget exhausted: keep going on sweeps alone, or stop the
/// process when the sweep task is gone too.
fn degrade(
    health: &SyncHealth,
    shutdown: &CancellationToken,
    fatal: &Mutex<Option<SyncError>>,
    last_error: SyncError,
) {
    health.set_watcher_alive(false);
    if health.timer_alive() {
        health.set_watcher_degraded(true);
        error!(
            error = %last_error,
            "watch provider unavailable; falling back to sweep-only mode"
        );
    } else {
        error!(
            error = %last_error,
            "watch provider unavailable and periodic sweeps are not running; shutting down"
        );
        *fatal.lock() = Some(last_error);
        shutdown.cancel();
    }
}
