use std::time::Duration;

use photosync_model::ThumbnailSize;
use serde::{Deserialize, Serialize};

/// Knobs for the reconciliation engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on per-path reconciliations running at once.
    pub max_concurrency: usize,
    /// Variants rendered for every newly admitted identity.
    pub thumbnail_sizes: Vec<ThumbnailSize>,
    /// Files buffered between the tree walk and the reconcile workers.
    pub walk_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get().max(1),
            thumbnail_sizes: ThumbnailSize::ALL.to_vec(),
            walk_buffer: 256,
        }
    }
}

/// Process-lifetime scheduling for the coordinator.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Run one full sweep before declaring readiness.
    pub initial_sync_on_startup: bool,
    /// Cadence of backstop sweeps (milliseconds, > 0)
    pub periodic_sync_interval_ms: u64,
    /// Re-subscription attempts after the watch provider fails.
    pub retry_attempts: u32,
    /// Base delay before the first re-subscription; doubles per attempt (ms)
    pub retry_delay_ms: u64,
    /// How long in-flight work may continue after a shutdown signal (ms)
    pub shutdown_drain_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            initial_sync_on_startup: true,
            periodic_sync_interval_ms: 3_600_000,
            retry_attempts: 3,
            retry_delay_ms: 5_000,
            shutdown_drain_timeout_ms: 30_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn periodic_sync_interval(&self) -> Duration {
        Duration::from_millis(self.periodic_sync_interval_ms.max(1))
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_timeout_ms)
    }

    /// Delay before re-subscription attempt `attempt` (1-based).
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor))
    }
}
