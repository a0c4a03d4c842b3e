//! Process-wide tracing setup.
//!
//! Diagnostics always go to stderr; stdout is reserved for tool results.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Checked before `RUST_LOG`.
pub const LOG_ENV: &str = "EDITGATE_LOG";

pub fn init(verbose: bool, no_color: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(!no_color),
        )
        .with(filter)
        .try_init();
}
