//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise `level` applies to this crate and
//! everything else stays at `warn`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global fmt subscriber. A second call is a no-op.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,navis_env_lib={level},navis_env={level}")));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact());

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::debug!(version = env!("CARGO_PKG_VERSION"), "logging initialized");
    }
}
