//! Developer diagnostics.
//!
//! Module authors read the log file; this is for whoever is debugging the supervisor
//! itself. Output goes to stderr, filtered by `SHIV_TRACE` (same syntax as `RUST_LOG`).

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const TRACE_ENV: &str = "SHIV_TRACE";

const DEFAULT_FILTER: &str = "shiv_core=warn";

/// Install the global subscriber. Hosts call this on attach; if the embedding process
/// already installed one, that one is kept.
pub fn init() {
    let filter = EnvFilter::try_from_env(TRACE_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact(),
        )
        .try_init();

    if installed.is_ok() {
        tracing::debug!("tracing initialized");
    }
}
