use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "food_permits=info,tower_http=info";

/// Console logging, filtered by RUST_LOG when set
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .init();
}
