use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// `RUST_LOG` wins when set; otherwise the configured level applies to our
/// crates with quieter defaults for HTTP and SQL chatter.
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives(level).into())
}

pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!(
        "{level},photosync_core={level},photosync_server={level},photosync_config={level},tower_http=warn,sqlx=warn"
    )
}

pub fn init_tracing(level: Level) {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_scope_the_configured_level() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("photosync_core=debug"));
        assert!(directives.contains("tower_http=warn"));
    }
}
