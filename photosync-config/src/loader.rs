use once_cell::sync::Lazy;
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::Level;
use url::Url;

use photosync_core::scan::DEFAULT_SUPPORTED_EXTENSIONS;
use photosync_model::ThumbnailSize;

use crate::{
    models::{ConfigMetadata, DatabaseConfig, HealthServerConfig, SyncConfig},
    sources::{EnvConfig, FileConfig, FileDatabaseConfig},
    validation::ConfigWarnings,
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("photosync.toml"),
        PathBuf::from("config/photosync.toml"),
    ]
});

const DEFAULT_HEALTH_HOST: &str = "0.0.0.0";
const DEFAULT_HEALTH_PORT: u16 = 8001;
const DEFAULT_PERIODIC_SYNC_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_EVENT_DEBOUNCE_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_BATCH_SIZE: usize = 100;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_THUMBNAIL_CACHE_DIR: &str = "./cache/thumbnails";

const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_NAME: &str = "photography_server";
const DEFAULT_DB_USER: &str = "postgres";

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Load `.env` into the process environment, then compose configuration
    /// from the process environment, the TOML file and defaults.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let env_config = EnvConfig::gather()?;
        self.load_with_env(env_config, env_file_loaded)
    }

    /// Compose configuration from an injected environment lookup. The process
    /// environment and `.env` files are not consulted.
    pub fn load_from_lookup<F>(&self, lookup: F) -> Result<ConfigLoad, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_config = EnvConfig::from_lookup(lookup)?;
        self.load_with_env(env_config, false)
    }

    fn load_with_env(
        &self,
        env_config: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env_config)?;

        let (config, warnings) =
            compose_config(file_config, env_config, config_path, env_file_loaded)?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env_config.config_path.clone());

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.is_file())
            {
                Some(path) => path.clone(),
                None => return Ok((None, None)),
            },
        };

        let contents = fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
            path: path.clone(),
            source: err,
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
    env_file_loaded: bool,
) -> Result<(SyncConfig, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if config_path.is_none() {
        warnings.push_with_hint(
            "No photosync.toml detected; using environment variables and defaults",
            "Pass --config or set SYNC_CONFIG_PATH to load a file",
        );
    }
    if env.base_path_from_alias {
        warnings.push_with_hint(
            "SYNC_BASE_PATH is an alias",
            "Prefer SYNC_PHOTOS_BASE_PATH",
        );
    }

    let file = file_config.unwrap_or_default();
    let FileConfig {
        base_path: file_base_path,
        initial_sync_on_startup: file_initial_sync,
        periodic_sync_interval: file_periodic_interval,
        health_check_host: file_health_host,
        health_check_port: file_health_port,
        log_level: file_log_level,
        supported_extensions: file_extensions,
        event_debounce_delay: file_debounce,
        max_batch_size: file_max_batch,
        retry_attempts: file_retry_attempts,
        retry_delay: file_retry_delay,
        max_concurrency: file_max_concurrency,
        shutdown_drain_timeout: file_drain_timeout,
        thumbnail_cache_dir: file_thumbnail_dir,
        thumbnail_sizes: file_thumbnail_sizes,
        database: file_database,
    } = file;

    let base_path = resolve_base_path(env.base_path.clone().or(file_base_path))?;

    let initial_sync_on_startup = env
        .initial_sync_on_startup
        .or(file_initial_sync)
        .unwrap_or(true);

    let periodic_sync_interval = match env
        .periodic_sync_interval
        .clone()
        .or(file_periodic_interval.map(|d| d.as_raw()))
    {
        Some(raw) => parse_duration("periodic_sync_interval", &raw)?,
        None => DEFAULT_PERIODIC_SYNC_INTERVAL,
    };
    if periodic_sync_interval.is_zero() {
        return Err(ConfigLoadError::invalid(
            "periodic_sync_interval",
            "must be greater than zero",
        ));
    }

    let health = HealthServerConfig {
        host: env
            .health_check_host
            .clone()
            .or(file_health_host)
            .unwrap_or_else(|| DEFAULT_HEALTH_HOST.to_string()),
        port: env
            .health_check_port
            .or(file_health_port)
            .unwrap_or(DEFAULT_HEALTH_PORT),
    };

    let log_level = match env.log_level.clone().or(file_log_level) {
        Some(raw) => parse_log_level(&raw)?,
        None => Level::INFO,
    };

    let supported_extensions = match env
        .supported_extensions
        .clone()
        .or(file_extensions.map(|list| list.into_items()))
    {
        Some(list) => normalize_extensions(list)?,
        None => DEFAULT_SUPPORTED_EXTENSIONS
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
    };

    let event_debounce_delay = match env
        .event_debounce_delay
        .clone()
        .or(file_debounce.map(|d| d.as_raw()))
    {
        Some(raw) => parse_duration("event_debounce_delay", &raw)?,
        None => DEFAULT_EVENT_DEBOUNCE_DELAY,
    };

    let max_batch_size = env
        .max_batch_size
        .or(file_max_batch)
        .unwrap_or(DEFAULT_MAX_BATCH_SIZE);
    if max_batch_size == 0 {
        return Err(ConfigLoadError::invalid(
            "max_batch_size",
            "must be greater than zero",
        ));
    }

    let retry_attempts = env
        .retry_attempts
        .or(file_retry_attempts)
        .unwrap_or(DEFAULT_RETRY_ATTEMPTS);

    let retry_delay = match env
        .retry_delay
        .clone()
        .or(file_retry_delay.map(|d| d.as_raw()))
    {
        Some(raw) => parse_duration("retry_delay", &raw)?,
        None => DEFAULT_RETRY_DELAY,
    };

    let max_concurrency = env
        .max_concurrency
        .or(file_max_concurrency)
        .unwrap_or_else(|| num_cpus::get().max(1));
    if max_concurrency == 0 {
        return Err(ConfigLoadError::invalid(
            "max_concurrency",
            "must be greater than zero",
        ));
    }

    let shutdown_drain_timeout = match env
        .shutdown_drain_timeout
        .clone()
        .or(file_drain_timeout.map(|d| d.as_raw()))
    {
        Some(raw) => parse_duration("shutdown_drain_timeout", &raw)?,
        None => DEFAULT_SHUTDOWN_DRAIN_TIMEOUT,
    };

    let thumbnail_cache_dir = env
        .thumbnail_cache_dir
        .clone()
        .or(file_thumbnail_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_THUMBNAIL_CACHE_DIR));

    let thumbnail_sizes = match env
        .thumbnail_sizes
        .clone()
        .or(file_thumbnail_sizes.map(|list| list.into_items()))
    {
        Some(list) => parse_thumbnail_sizes(list)?,
        None => ThumbnailSize::ALL.to_vec(),
    };

    let database = DatabaseConfig {
        url: resolve_database_url(&env, &file_database)?,
    };
    if !database.is_configured() {
        warnings.push_with_hint(
            "No database configured; the catalog lives in memory and is lost on exit",
            "Set DATABASE_URL or SYNC_DB_* to persist the catalog in Postgres",
        );
    }

    let metadata = ConfigMetadata {
        config_path,
        env_file_loaded,
    };

    let config = SyncConfig {
        base_path,
        initial_sync_on_startup,
        periodic_sync_interval,
        health,
        log_level,
        supported_extensions,
        event_debounce_delay,
        max_batch_size,
        retry_attempts,
        retry_delay,
        max_concurrency,
        shutdown_drain_timeout,
        thumbnail_cache_dir,
        thumbnail_sizes,
        database,
        metadata,
    };

    Ok((config, warnings))
}

fn resolve_base_path(candidate: Option<PathBuf>) -> Result<PathBuf, ConfigLoadError> {
    let Some(path) = candidate else {
        return Err(ConfigLoadError::invalid(
            "base_path",
            "is required (set SYNC_PHOTOS_BASE_PATH or base_path)",
        ));
    };

    let metadata = fs::metadata(&path).map_err(|err| {
        ConfigLoadError::invalid(
            "base_path",
            format!("{} is not accessible: {err}", path.display()),
        )
    })?;
    if !metadata.is_dir() {
        return Err(ConfigLoadError::invalid(
            "base_path",
            format!("{} is not a directory", path.display()),
        ));
    }

    fs::canonicalize(&path).map_err(|err| {
        ConfigLoadError::invalid(
            "base_path",
            format!("{} cannot be resolved: {err}", path.display()),
        )
    })
}

/// Plain seconds (`30`, `2.5`) or a humantime string (`1h 30m`).
fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigLoadError> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<f64>() {
        if !secs.is_finite() || secs < 0.0 {
            return Err(ConfigLoadError::invalid(
                key,
                format!("'{raw}' must be a non-negative number of seconds"),
            ));
        }
        return Ok(Duration::from_secs_f64(secs));
    }

    humantime::parse_duration(raw).map_err(|err| {
        ConfigLoadError::invalid(key, format!("'{raw}' is not a valid duration: {err}"))
    })
}

fn parse_log_level(raw: &str) -> Result<Level, ConfigLoadError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ConfigLoadError::invalid(
            "log_level",
            format!("'{raw}' is not one of trace, debug, info, warn, error"),
        )),
    }
}

fn normalize_extensions(list: Vec<String>) -> Result<Vec<String>, ConfigLoadError> {
    let extensions: BTreeSet<String> = list
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    if extensions.is_empty() {
        return Err(ConfigLoadError::invalid(
            "supported_extensions",
            "must list at least one extension",
        ));
    }
    Ok(extensions.into_iter().collect())
}

fn parse_thumbnail_sizes(list: Vec<String>) -> Result<Vec<ThumbnailSize>, ConfigLoadError> {
    let mut sizes = Vec::with_capacity(list.len());
    for raw in &list {
        let size = raw
            .parse::<ThumbnailSize>()
            .map_err(|err| ConfigLoadError::invalid("thumbnail_sizes", err.to_string()))?;
        if !sizes.contains(&size) {
            sizes.push(size);
        }
    }
    if sizes.is_empty() {
        return Err(ConfigLoadError::invalid(
            "thumbnail_sizes",
            "must list at least one size",
        ));
    }
    Ok(sizes)
}

fn resolve_database_url(
    env: &EnvConfig,
    file_database: &FileDatabaseConfig,
) -> Result<Option<String>, ConfigLoadError> {
    let explicit = env.database_url.clone().or_else(|| {
        file_database
            .url
            .clone()
            .filter(|value| !value.trim().is_empty())
    });
    if let Some(raw) = explicit {
        let parsed = Url::parse(raw.trim())
            .map_err(|source| ConfigLoadError::InvalidDatabaseUrl { source })?;
        return Ok(Some(parsed.to_string()));
    }

    let host = env.database_host.clone().or(file_database.host.clone());
    let port = env.database_port.or(file_database.port);
    let name = env.database_name.clone().or(file_database.name.clone());
    let user = env.database_user.clone().or(file_database.user.clone());
    let password = env
        .database_password
        .clone()
        .or(file_database.password.clone());

    if host.is_none() && port.is_none() && name.is_none() && user.is_none() && password.is_none()
    {
        return Ok(None);
    }

    let host = host.unwrap_or_else(|| DEFAULT_DB_HOST.to_string());
    let port = port.unwrap_or(DEFAULT_DB_PORT);
    let name = name.unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
    let user = user.unwrap_or_else(|| DEFAULT_DB_USER.to_string());

    let mut url = Url::parse(&format!("postgresql://{host}:{port}/{name}"))
        .map_err(|source| ConfigLoadError::InvalidDatabaseUrl { source })?;
    url.set_username(&user)
        .map_err(|_| ConfigLoadError::InvalidDatabaseUsername {
            username: user.clone(),
        })?;
    if let Some(password) = password {
        url.set_password(Some(&password))
            .map_err(|_| ConfigLoadError::InvalidDatabasePassword)?;
    }
    Ok(Some(url.to_string()))
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
    #[error("invalid database URL")]
    InvalidDatabaseUrl {
        #[source]
        source: url::ParseError,
    },
    #[error("invalid database username '{username}'")]
    InvalidDatabaseUsername { username: String },
    #[error("failed to encode database password into URL")]
    InvalidDatabasePassword,
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

impl ConfigLoadError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigLoadError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// The offending key, for validation failures.
    pub fn key(&self) -> Option<&str> {
        match self {
            ConfigLoadError::Invalid { key, .. } => Some(key),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: SyncConfig,
    pub warnings: ConfigWarnings,
}

impl ConfigLoad {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.metadata.config_path.as_deref()
    }
}
