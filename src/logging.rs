//! Logging setup for binaries and test harnesses.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is the embedder's choice. `init()` wires the standard fmt subscriber
//! with `RUST_LOG`-style filtering and is safe to call more than once.

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber with env-filter support. Repeat calls are
/// no-ops, so test binaries can call this per-test.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
