//! Logging configuration using tracing
//!
//! Logs go to stderr so stdout carries only the JSON result.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber
///
/// Filtering follows `RUST_LOG`, defaulting to `warn`. Useful values:
/// - `RUST_LOG=storage=debug` shows cache hits and misses
/// - `RUST_LOG=graph_core=debug` shows pagination and window bounds
///
/// # Errors
/// Returns an error if a subscriber has already been installed
pub fn init() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}
