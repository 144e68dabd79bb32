//! Diagnostics setup for the binary.
//!
//! `.env` is loaded before the subscriber is built so that a `RUST_LOG`
//! set there takes effect.

use std::io;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Builds the log filter from a `RUST_LOG` value.
#[must_use]
pub fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Loads `.env` from the working directory (a missing file is fine), then
/// installs the stderr subscriber.
pub fn init() {
    let dotenv = dotenvy::dotenv();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .with_writer(io::stderr)
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring .env"),
    }
}
