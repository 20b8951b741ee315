use crate::config::AppConfig;
use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber: JSON lines in production so the log
/// shipper can ingest them, compact human output everywhere else.
pub fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);

    if config.is_production() {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
