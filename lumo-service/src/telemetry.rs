//! Tracing bootstrap shared by worker binaries.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber from `RUST_LOG`, defaulting to
/// `info`. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
