//! Structured logging setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber for a binary. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}
