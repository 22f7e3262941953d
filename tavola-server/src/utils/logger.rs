//! Logging setup

use tracing_subscriber::EnvFilter;

/// Initialize structured logging; `RUST_LOG` overrides the default filter.
pub fn init_logger() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tavola_server=info,tower_http=info".into()),
        )
        .init();
}
