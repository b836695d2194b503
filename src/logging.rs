use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Respects `RUST_LOG`, defaults to
/// `info`. Errors if a subscriber is already installed.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}
