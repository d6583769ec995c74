use serde::Deserialize;
use std::path::PathBuf;

use crate::loader::ConfigLoadError;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    pub base_path: Option<PathBuf>,
    pub initial_sync_on_startup: Option<bool>,
    pub periodic_sync_interval: Option<FileDuration>,
    pub health_check_host: Option<String>,
    pub health_check_port: Option<u16>,
    pub log_level: Option<String>,
    pub supported_extensions: Option<FileList>,
    pub event_debounce_delay: Option<FileDuration>,
    pub max_batch_size: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_delay: Option<FileDuration>,
    pub max_concurrency: Option<usize>,
    pub shutdown_drain_timeout: Option<FileDuration>,
    pub thumbnail_cache_dir: Option<PathBuf>,
    pub thumbnail_sizes: Option<FileList>,
    #[serde(default)]
    pub database: FileDatabaseConfig,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileDatabaseConfig {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Durations in TOML may be written as seconds (`30`, `2.5`) or as a
/// humantime string (`"1h"`, `"500ms"`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FileDuration {
    Seconds(f64),
    Text(String),
}

impl FileDuration {
    pub(crate) fn as_raw(&self) -> String {
        match self {
            FileDuration::Seconds(secs) => secs.to_string(),
            FileDuration::Text(text) => text.clone(),
        }
    }
}

/// A list given either as a TOML array or as a comma-separated string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FileList {
    Items(Vec<String>),
    Csv(String),
}

impl FileList {
    pub(crate) fn into_items(self) -> Vec<String> {
        match self {
            FileList::Items(items) => items
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            FileList::Csv(raw) => split_csv(&raw),
        }
    }
}

/// Environment-derived configuration values.
///
/// Every value is parsed up front so a malformed number or flag fails the
/// load instead of silently falling back to a default.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub base_path: Option<PathBuf>,
    pub base_path_from_alias: bool,
    pub initial_sync_on_startup: Option<bool>,
    pub periodic_sync_interval: Option<String>,
    pub health_check_host: Option<String>,
    pub health_check_port: Option<u16>,
    pub log_level: Option<String>,
    pub supported_extensions: Option<Vec<String>>,
    pub event_debounce_delay: Option<String>,
    pub max_batch_size: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_delay: Option<String>,
    pub max_concurrency: Option<usize>,
    pub shutdown_drain_timeout: Option<String>,
    pub thumbnail_cache_dir: Option<PathBuf>,
    pub thumbnail_sizes: Option<Vec<String>>,
    pub database_url: Option<String>,
    pub database_host: Option<String>,
    pub database_port: Option<u16>,
    pub database_name: Option<String>,
    pub database_user: Option<String>,
    pub database_password: Option<String>,
}

impl EnvConfig {
    /// Read the process environment.
    pub fn gather() -> Result<Self, ConfigLoadError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup. Empty values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut env_config = Self::default();

        env_config.config_path = var("SYNC_CONFIG_PATH").map(PathBuf::from);

        if let Some(path) = var("SYNC_PHOTOS_BASE_PATH") {
            env_config.base_path = Some(PathBuf::from(path));
        } else if let Some(path) = var("SYNC_BASE_PATH") {
            env_config.base_path = Some(PathBuf::from(path));
            env_config.base_path_from_alias = true;
        }

        env_config.initial_sync_on_startup = var("SYNC_INITIAL_SYNC_ON_STARTUP")
            .map(|raw| parse_bool("SYNC_INITIAL_SYNC_ON_STARTUP", &raw))
            .transpose()?;
        env_config.periodic_sync_interval = var("SYNC_PERIODIC_SYNC_INTERVAL");
        env_config.health_check_host = var("SYNC_HEALTH_CHECK_HOST");
        env_config.health_check_port = var("SYNC_HEALTH_CHECK_PORT")
            .map(|raw| parse_number("SYNC_HEALTH_CHECK_PORT", &raw))
            .transpose()?;
        env_config.log_level = var("SYNC_LOG_LEVEL");
        env_config.supported_extensions =
            var("SYNC_SUPPORTED_EXTENSIONS").map(|raw| split_csv(&raw));
        env_config.event_debounce_delay = var("SYNC_EVENT_DEBOUNCE_DELAY");
        env_config.max_batch_size = var("SYNC_MAX_BATCH_SIZE")
            .map(|raw| parse_number("SYNC_MAX_BATCH_SIZE", &raw))
            .transpose()?;
        env_config.retry_attempts = var("SYNC_RETRY_ATTEMPTS")
            .map(|raw| parse_number("SYNC_RETRY_ATTEMPTS", &raw))
            .transpose()?;
        env_config.retry_delay = var("SYNC_RETRY_DELAY");
        env_config.max_concurrency = var("SYNC_MAX_CONCURRENCY")
            .map(|raw| parse_number("SYNC_MAX_CONCURRENCY", &raw))
            .transpose()?;
        env_config.shutdown_drain_timeout = var("SYNC_SHUTDOWN_DRAIN_TIMEOUT");
        env_config.thumbnail_cache_dir =
            var("SYNC_THUMBNAIL_CACHE_DIR").map(PathBuf::from);
        env_config.thumbnail_sizes =
            var("SYNC_THUMBNAIL_SIZES").map(|raw| split_csv(&raw));

        env_config.database_url =
            var("SYNC_DATABASE_URL").or_else(|| var("DATABASE_URL"));
        env_config.database_host = var("SYNC_DB_HOST");
        env_config.database_port = var("SYNC_DB_PORT")
            .map(|raw| parse_number("SYNC_DB_PORT", &raw))
            .transpose()?;
        env_config.database_name = var("SYNC_DB_NAME");
        env_config.database_user = var("SYNC_DB_USER");
        env_config.database_password = var("SYNC_DB_PASSWORD");

        Ok(env_config)
    }
}

pub(crate) fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

pub(crate) fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigLoadError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigLoadError::invalid(
            key,
            format!("expected a boolean, got '{raw}'"),
        )),
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigLoadError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|err| {
        ConfigLoadError::invalid(key, format!("'{raw}' is not a valid number: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn primary_base_path_wins_over_alias() {
        let env = EnvConfig::from_lookup(lookup(&[
            ("SYNC_PHOTOS_BASE_PATH", "/photos"),
            ("SYNC_BASE_PATH", "/elsewhere"),
        ]))
        .unwrap();
        assert_eq!(env.base_path, Some(PathBuf::from("/photos")));
        assert!(!env.base_path_from_alias);

        let env =
            EnvConfig::from_lookup(lookup(&[("SYNC_BASE_PATH", "/elsewhere")])).unwrap();
        assert_eq!(env.base_path, Some(PathBuf::from("/elsewhere")));
        assert!(env.base_path_from_alias);
    }

    #[test]
    fn malformed_numbers_are_rejected_with_their_key() {
        let err = EnvConfig::from_lookup(lookup(&[("SYNC_MAX_BATCH_SIZE", "lots")]))
            .unwrap_err();
        match err {
            ConfigLoadError::Invalid { key, .. } => assert_eq!(key, "SYNC_MAX_BATCH_SIZE"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for raw in ["1", "TRUE", "yes", "On"] {
            assert!(parse_bool("k", raw).unwrap());
        }
        for raw in ["0", "false", "NO", "off"] {
            assert!(!parse_bool("k", raw).unwrap());
        }
        assert!(parse_bool("k", "maybe").is_err());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let env = EnvConfig::from_lookup(lookup(&[
            ("SYNC_LOG_LEVEL", "   "),
            ("SYNC_SUPPORTED_EXTENSIONS", "jpg, ,PNG,"),
        ]))
        .unwrap();
        assert_eq!(env.log_level, None);
        assert_eq!(
            env.supported_extensions,
            Some(vec!["jpg".to_string(), "PNG".to_string()])
        );
    }

    #[test]
    fn file_lists_and_durations_accept_both_shapes() {
        let file: FileConfig = toml::from_str(
            r#"
            periodic_sync_interval = "15m"
            event_debounce_delay = 0.5
            supported_extensions = ["jpg", "heic"]
            thumbnail_sizes = "small,large"
            "#,
        )
        .unwrap();
        assert_eq!(
            file.periodic_sync_interval,
            Some(FileDuration::Text("15m".into()))
        );
        assert_eq!(file.event_debounce_delay, Some(FileDuration::Seconds(0.5)));
        assert_eq!(
            file.supported_extensions.unwrap().into_items(),
            vec!["jpg".to_string(), "heic".to_string()]
        );
        assert_eq!(
            file.thumbnail_sizes.unwrap().into_items(),
            vec!["small".to_string(), "large".to_string()]
        );
    }
}
