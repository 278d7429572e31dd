//! Log subscriber setup for the binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! binary's job. Logs go to stderr so reports on stdout stay pipeable.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (`RUST_LOG` syntax).
pub const LOG_ENV: &str = "RHEO_LOG";

/// Filter from `RHEO_LOG`, then `RUST_LOG`, else `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
