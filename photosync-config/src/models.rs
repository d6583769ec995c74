use std::path::{Path, PathBuf};
use std::time::Duration;

use photosync_core::scan::{FileFilter, FsWatchConfig};
use photosync_core::sync::{CoordinatorConfig, EngineConfig};
use photosync_model::ThumbnailSize;
use tracing::Level;
use url::Url;

/// Fully resolved configuration for one sync process.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Canonical root of the watched tree.
    pub base_path: PathBuf,
    pub initial_sync_on_startup: bool,
    pub periodic_sync_interval: Duration,
    pub health: HealthServerConfig,
    pub log_level: Level,
    pub supported_extensions: Vec<String>,
    pub event_debounce_delay: Duration,
    pub max_batch_size: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub max_concurrency: usize,
    pub shutdown_drain_timeout: Duration,
    pub thumbnail_cache_dir: PathBuf,
    pub thumbnail_sizes: Vec<ThumbnailSize>,
    pub database: DatabaseConfig,
    pub metadata: ConfigMetadata,
}

impl SyncConfig {
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn thumbnail_cache_dir(&self) -> &Path {
        &self.thumbnail_cache_dir
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrency: self.max_concurrency,
            thumbnail_sizes: self.thumbnail_sizes.clone(),
            ..EngineConfig::default()
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            initial_sync_on_startup: self.initial_sync_on_startup,
            periodic_sync_interval_ms: millis(self.periodic_sync_interval),
            retry_attempts: self.retry_attempts,
            retry_delay_ms: millis(self.retry_delay),
            shutdown_drain_timeout_ms: millis(self.shutdown_drain_timeout),
        }
    }

    pub fn watch_config(&self) -> FsWatchConfig {
        FsWatchConfig {
            debounce_window: self.event_debounce_delay,
            max_batch_events: self.max_batch_size,
        }
    }

    pub fn file_filter(&self) -> FileFilter {
        FileFilter::new(&self.supported_extensions)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthServerConfig {
    pub host: String,
    pub port: u16,
}

impl HealthServerConfig {
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Postgres connection URL. `None` selects the in-memory catalog.
    pub url: Option<String>,
}

impl DatabaseConfig {
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// The URL with any password masked, for logs.
    pub fn redacted_url(&self) -> Option<String> {
        let raw = self.url.as_deref()?;
        match Url::parse(raw) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    // Only fails for cannot-be-a-base URLs, which carry no password.
                    let _ = parsed.set_password(Some("****"));
                }
                Some(parsed.to_string())
            }
            Err(_) => Some("<unparseable>".to_string()),
        }
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_url_masks_password_only() {
        let db = DatabaseConfig {
            url: Some("postgresql://sync:hunter2@db:5432/photos".into()),
        };
        assert_eq!(
            db.redacted_url().as_deref(),
            Some("postgresql://sync:****@db:5432/photos")
        );

        let db = DatabaseConfig {
            url: Some("postgresql://sync@db/photos".into()),
        };
        assert_eq!(
            db.redacted_url().as_deref(),
            Some("postgresql://sync@db/photos")
        );
        assert_eq!(DatabaseConfig::default().redacted_url(), None);
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let health = HealthServerConfig {
            host: "::".into(),
            port: 8001,
        };
        assert_eq!(health.bind_address(), "[::]:8001");

        let health = HealthServerConfig {
            host: "0.0.0.0".into(),
            port: 8001,
        };
        assert_eq!(health.bind_address(), "0.0.0.0:8001");
    }
}
