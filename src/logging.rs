//! Diagnostic output for the command line tool.
//!
//! Diagnostics go to stderr so they never mix with the annotated text on
//! stdout. `RUST_LOG` takes precedence over the default level.

use std::io;

use tracing_subscriber::EnvFilter;

/// Level used when `RUST_LOG` is not set.
pub fn default_level(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "warn"
    }
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init_logging(debug: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(debug)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(debug)
        .without_time()
        .try_init();
}
