use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Resolves on Ctrl+C, SIGTERM or when `token` is cancelled (a fatal
/// coordinator error). Cancels `token` on the way out so every listener
/// observes the same shutdown.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C; shutting down"),
        () = terminate => info!("received SIGTERM; shutting down"),
        () = token.cancelled() => info!("sync coordinator requested shutdown"),
    }
    token.cancel();
}
