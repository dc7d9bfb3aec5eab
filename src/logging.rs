//! Tracing initialization for the CLI and the admin server.

use tracing_subscriber::EnvFilter;

/// Everything at info, plus per-request traces from the HTTP layer
const DEFAULT_FILTER: &str = "info,tower_http=debug";

fn default_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

/// Install the global subscriber, filtered by `RUST_LOG`.
///
/// Human-readable output by default, JSON lines when `json` is set.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
