use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Installs the global subscriber. `log` records from the library crates are
/// forwarded into it.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().with_target(false).init(),
        LogFormat::Text => builder.init(),
    }

    tracing::info!(format = ?format, "logging initialized");
}
