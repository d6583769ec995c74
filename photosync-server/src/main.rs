use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use photosync_config::{ConfigLoad, ConfigLoader, ConfigLoaderOptions};
use photosync_server::{
    http::{AppState, router},
    shutdown::shutdown_signal,
    startup::{SyncRuntime, asset_store, build_runtime, connect_catalog},
    telemetry::init_tracing,
};
use tracing::{error, info, warn};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "photosync")]
#[command(about = "Keeps a photo catalog in sync with a directory tree")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env when present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Health server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Health server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let ConfigLoad {
        mut config,
        warnings,
    } = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.config,
        env_file: cli.env_file,
    })
    .load()
    .context("failed to load configuration")?;

    if let Some(port) = cli.port {
        config.health.port = port;
    }
    if let Some(host) = cli.host {
        config.health.host = host;
    }

    init_tracing(config.log_level);

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = config.metadata.config_path.as_ref() {
        info!(path = %path.display(), "loaded configuration file");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }
    info!(
        base_path = %config.base_path.display(),
        periodic_sync_interval_s = config.periodic_sync_interval.as_secs(),
        max_concurrency = config.max_concurrency,
        extensions = %config.supported_extensions.join(","),
        "starting photosync"
    );

    let catalog = connect_catalog(&config).await?;
    let assets = asset_store(&config);
    let SyncRuntime {
        coordinator,
        health,
        catalog,
    } = build_runtime(&config, catalog, assets);

    let token = coordinator.shutdown_token();
    let addr = config.health.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind health server on {addr}"))?;
    info!(%addr, "health server listening");

    let app = router(AppState::new(health, catalog));
    let server_token = token.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
    });
    let signals = tokio::spawn(shutdown_signal(token.clone()));

    let started = tokio::select! {
        result = coordinator.start() => Some(result),
        () = token.cancelled() => None,
    };
    match started {
        Some(Ok(())) => {
            info!("sync coordinator running");
            token.cancelled().await;
        }
        Some(Err(err)) => {
            error!(kind = %err.kind(), error = %err, "sync coordinator failed to start");
            token.cancel();
            coordinator.shutdown().await;
            let _ = server.await;
            signals.abort();
            return Err(anyhow::Error::new(err).context("startup failed"));
        }
        None => info!("shutdown requested during startup"),
    }

    coordinator.shutdown().await;
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "health server exited with an error"),
        Err(err) => error!(error = %err, "health server task failed"),
    }
    signals.abort();

    if let Some(err) = coordinator.take_fatal() {
        return Err(anyhow::Error::new(err).context("sync engine stopped"));
    }
    info!("photosync stopped");
    Ok(())
}
