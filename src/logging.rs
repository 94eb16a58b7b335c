//! Logging setup.
//!
//! Human-readable lines on stderr so stdout stays clean for JSON output.
//! `RUST_LOG` overrides the default level.

use std::io;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Later calls are no-ops.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
