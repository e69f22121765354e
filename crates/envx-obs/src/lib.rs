use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when RUST_LOG is unset
pub const DEFAULT_FILTER: &str = "info,envx=debug";

/// Initialize logging for a pipeline process.
/// - RUST_LOG respected; default to "info,envx=debug"
/// - JSON lines when `json` is set, human-readable text otherwise
pub fn init(service_name: &str, json: bool) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let registry = tracing_subscriber::registry().with(EnvFilter::new(env_filter));

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(service = %service_name, json, "Logging initialized");
}
