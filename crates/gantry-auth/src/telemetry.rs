//! Tracing subscriber bootstrap for binaries and tests.
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global fmt subscriber once. `RUST_LOG` wins over the supplied
/// default directive. Safe to call from multiple tests; later calls are
/// no-ops.
pub fn init_tracing(default_directive: &str) {
    let directive = default_directive.to_string();
    INIT.get_or_init(move || {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(directive));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
