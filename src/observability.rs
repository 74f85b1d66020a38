//! Structured logging setup: a `tracing`/`tracing-subscriber` `EnvFilter`
//! seeded from `RUST_LOG`, falling back to a per-crate default directive.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. Call once, at process start.
///
/// # Errors
/// Returns an error if the default filter directive fails to parse (it
/// never should, since it's a hardcoded string) or if a subscriber is
/// already installed.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("routerd=info"))?;
    tracing_subscriber::fmt().with_env_filter(filter).try_init()?;
    Ok(())
}
