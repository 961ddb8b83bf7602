//! Tracing bootstrap shared by binaries and integration tests.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing from `RUST_LOG`, falling back to the given level.
/// Safe to call more than once; later calls are no-ops.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}
