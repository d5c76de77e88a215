//! Logging setup shared by binaries, demos and tests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a registry with an `EnvFilter` (from `RUST_LOG`, else `default`) and a fmt layer.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}
