//! Reconciliation of the watched tree against the catalog.

mod config;
mod coordinator;
mod engine;
mod health;
mod locks;
mod state;

pub use config::{CoordinatorConfig, EngineConfig};
pub use coordinator::SyncCoordinator;
pub use engine::{PathOutcome, ReconciliationEngine};
pub use health::{HealthReport, HealthStatus, StatsReport, SyncHealth};
pub use locks::{PathLease, PathLocks};
pub use state::{SyncEntry, SyncState};
