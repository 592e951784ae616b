//! Shared test setup.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs an env-filtered tracing subscriber once per test binary.
///
/// Run with `RUST_LOG=keyflow_solve=trace` to watch the footprint
/// exploration.
pub fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
