use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use photosync_config::{ConfigLoadError, ConfigLoader};
use photosync_model::ThumbnailSize;
use tempfile::TempDir;
use tracing::Level;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

fn photos_dir() -> TempDir {
    tempfile::tempdir().expect("tempdir")
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("photosync.toml");
    fs::write(&path, body).expect("write config");
    path
}

#[test]
fn defaults_apply_when_only_the_base_path_is_set() {
    let photos = photos_dir();
    let base = photos.path().to_string_lossy().into_owned();

    let load = ConfigLoader::new()
        .load_from_lookup(env(&[("SYNC_PHOTOS_BASE_PATH", base.as_str())]))
        .unwrap();
    let config = load.config;

    assert_eq!(
        config.base_path,
        fs::canonicalize(photos.path()).unwrap()
    );
    assert!(config.initial_sync_on_startup);
    assert_eq!(config.periodic_sync_interval, Duration::from_secs(3600));
    assert_eq!(config.health.bind_address(), "0.0.0.0:8001");
    assert_eq!(config.log_level, Level::INFO);
    assert_eq!(config.event_debounce_delay, Duration::from_secs(2));
    assert_eq!(config.max_batch_size, 100);
    assert_eq!(config.retry_attempts, 3);
    assert_eq!(config.retry_delay, Duration::from_secs(5));
    assert_eq!(config.shutdown_drain_timeout, Duration::from_secs(30));
    assert_eq!(config.thumbnail_sizes, ThumbnailSize::ALL.to_vec());
    assert!(config.max_concurrency >= 1);
    assert!(config.supported_extensions.contains(&"jpeg".to_string()));
    assert!(!config.database.is_configured());

    let messages: Vec<String> = load.warnings.iter().map(|w| w.message.clone()).collect();
    assert!(messages.iter().any(|m| m.contains("No photosync.toml")));
    assert!(messages.iter().any(|m| m.contains("in memory")));
}

#[test]
fn environment_overrides_file_which_overrides_defaults() {
    let photos = photos_dir();
    let config_dir = photos_dir();
    let config_path = write_config(
        config_dir.path(),
        &format!(
            r#"
            base_path = "{}"
            periodic_sync_interval = "10m"
            max_batch_size = 50
            log_level = "debug"
            thumbnail_sizes = ["small"]

            [database]
            url = "postgresql://file@db/photos"
            "#,
            photos.path().display()
        ),
    );

    let load = ConfigLoader::new()
        .with_config_path(&config_path)
        .load_from_lookup(env(&[
            ("SYNC_MAX_BATCH_SIZE", "25"),
            ("SYNC_DATABASE_URL", "postgresql://env@db/photos"),
        ]))
        .unwrap();
    let config = load.config;

    assert_eq!(config.periodic_sync_interval, Duration::from_secs(600));
    assert_eq!(config.max_batch_size, 25);
    assert_eq!(config.log_level, Level::DEBUG);
    assert_eq!(config.thumbnail_sizes, vec![ThumbnailSize::Small]);
    assert_eq!(
        config.database.url.as_deref(),
        Some("postgresql://env@db/photos")
    );
    assert_eq!(
        config.metadata.config_path.as_deref(),
        Some(config_path.as_path())
    );
}

#[test]
fn config_path_may_come_from_the_environment() {
    let photos = photos_dir();
    let config_dir = photos_dir();
    let config_path = write_config(
        config_dir.path(),
        &format!(
            "base_path = \"{}\"\nretry_attempts = 9\n",
            photos.path().display()
        ),
    );
    let config_path_str = config_path.to_string_lossy().into_owned();

    let load = ConfigLoader::new()
        .load_from_lookup(env(&[("SYNC_CONFIG_PATH", config_path_str.as_str())]))
        .unwrap();
    assert_eq!(load.config.retry_attempts, 9);
}

#[test]
fn explicit_config_path_must_exist() {
    let config_dir = photos_dir();
    let missing = config_dir.path().join("absent.toml");

    let err = ConfigLoader::new()
        .with_config_path(&missing)
        .load_from_lookup(env(&[]))
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { path } if path == missing));
}

#[test]
fn unknown_file_keys_fail_to_parse() {
    let config_dir = photos_dir();
    let config_path = write_config(config_dir.path(), "base_pth = \"/photos\"\n");

    let err = ConfigLoader::new()
        .with_config_path(&config_path)
        .load_from_lookup(env(&[]))
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Parse { .. }));
}

#[test]
fn base_path_must_exist_and_be_a_directory() {
    let err = ConfigLoader::new()
        .load_from_lookup(env(&[]))
        .unwrap_err();
    assert_eq!(err.key(), Some("base_path"));

    let photos = photos_dir();
    let missing = photos.path().join("nope").to_string_lossy().into_owned();
    let err = ConfigLoader::new()
        .load_from_lookup(env(&[("SYNC_PHOTOS_BASE_PATH", missing.as_str())]))
        .unwrap_err();
    assert_eq!(err.key(), Some("base_path"));

    let file = photos.path().join("file.jpg");
    fs::write(&file, b"x").unwrap();
    let file = file.to_string_lossy().into_owned();
    let err = ConfigLoader::new()
        .load_from_lookup(env(&[("SYNC_PHOTOS_BASE_PATH", file.as_str())]))
        .unwrap_err();
    assert_eq!(err.key(), Some("base_path"));
}

#[test]
fn zero_and_malformed_values_are_rejected() {
    let photos = photos_dir();
    let base = photos.path().to_string_lossy().into_owned();

    for (key, value, expected) in [
        ("SYNC_PERIODIC_SYNC_INTERVAL", "0", "periodic_sync_interval"),
        ("SYNC_MAX_BATCH_SIZE", "0", "max_batch_size"),
        ("SYNC_MAX_CONCURRENCY", "0", "max_concurrency"),
        ("SYNC_THUMBNAIL_SIZES", "small,huge", "thumbnail_sizes"),
        ("SYNC_RETRY_ATTEMPTS", "three", "SYNC_RETRY_ATTEMPTS"),
        ("SYNC_EVENT_DEBOUNCE_DELAY", "whenever", "event_debounce_delay"),
    ] {
        let err = ConfigLoader::new()
            .load_from_lookup(env(&[("SYNC_PHOTOS_BASE_PATH", base.as_str()), (key, value)]))
            .unwrap_err();
        assert_eq!(err.key(), Some(expected), "{key}={value}");
    }
}

#[test]
fn alias_base_path_is_accepted_with_a_warning() {
    let photos = photos_dir();
    let base = photos.path().to_string_lossy().into_owned();

    let load = ConfigLoader::new()
        .load_from_lookup(env(&[("SYNC_BASE_PATH", base.as_str())]))
        .unwrap();
    assert!(load
        .warnings
        .iter()
        .any(|w| w.message.contains("SYNC_BASE_PATH")));
}

#[test]
fn derived_component_configs_follow_the_loaded_values() {
    let photos = photos_dir();
    let base = photos.path().to_string_lossy().into_owned();

    let config = ConfigLoader::new()
        .load_from_lookup(env(&[
            ("SYNC_PHOTOS_BASE_PATH", base.as_str()),
            ("SYNC_INITIAL_SYNC_ON_STARTUP", "no"),
            ("SYNC_RETRY_DELAY", "0.25"),
            ("SYNC_EVENT_DEBOUNCE_DELAY", "500ms"),
            ("SYNC_MAX_CONCURRENCY", "3"),
            ("SYNC_SUPPORTED_EXTENSIONS", ".JPG,heic"),
        ]))
        .unwrap()
        .config;

    let coordinator = config.coordinator_config();
    assert!(!coordinator.initial_sync_on_startup);
    assert_eq!(coordinator.retry_delay_ms, 250);
    assert_eq!(coordinator.periodic_sync_interval_ms, 3_600_000);

    let watch = config.watch_config();
    assert_eq!(watch.debounce_window, Duration::from_millis(500));
    assert_eq!(watch.max_batch_events, 100);

    assert_eq!(config.engine_config().max_concurrency, 3);

    let filter = config.file_filter();
    assert!(filter.is_candidate("trips/a.jpg"));
    assert!(filter.is_candidate("trips/b.HEIC"));
    assert!(!filter.is_candidate("trips/c.png"));
}

#[test]
fn database_parts_compose_into_a_url() {
    let photos = photos_dir();
    let base = photos.path().to_string_lossy().into_owned();

    let config = ConfigLoader::new()
        .load_from_lookup(env(&[
            ("SYNC_PHOTOS_BASE_PATH", base.as_str()),
            ("SYNC_DB_HOST", "db"),
            ("SYNC_DB_NAME", "photos"),
            ("SYNC_DB_USER", "sync"),
            ("SYNC_DB_PASSWORD", "secret"),
        ]))
        .unwrap()
        .config;

    assert_eq!(
        config.database.url.as_deref(),
        Some("postgresql://sync:secret@db:5432/photos")
    );
    assert_eq!(
        config.database.redacted_url().as_deref(),
        Some("postgresql://sync:****@db:5432/photos")
    );
}
