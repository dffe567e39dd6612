//! Logging setup: `tracing-subscriber` fmt output filtered by an `EnvFilter`.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Fallback filter for commands that run without a config file.
const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber with `directives` (the configured
/// `log_level`, which already reflects `RUST_LOG`).
pub fn init(directives: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directives)
        .with_context(|| format!("Invalid log filter {directives:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// Subscriber for one-shot CLI commands: `RUST_LOG` if set, else info.
pub fn init_cli() -> Result<()> {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    init(&directives)
}
