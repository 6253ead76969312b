//! Structured-logging setup.

use tracing_subscriber::EnvFilter;

/// Install the default `RUST_LOG`-driven fmt subscriber, falling back to
/// `info` when the variable is unset. A no-op when a subscriber is already
/// installed, so embedding applications keep their own.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
