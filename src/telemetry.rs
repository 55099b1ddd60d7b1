use std::env;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset or empty.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Install the global `tracing` subscriber (fmt layer on stderr).
///
/// Returns `false` when a subscriber was already installed; calling it twice is harmless.
pub fn telemetry_init(verbose: bool) -> bool {
    let filter = env::var("RUST_LOG")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default_filter(verbose).to_string());
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|e| {
        eprintln!("ecui-runner: invalid RUST_LOG {filter:?} ({e}); using defaults");
        EnvFilter::new(default_filter(verbose))
    });
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
