//! Tracing initialization helpers

pub fn init_tracing() {
    init_tracing_with_default("firmware_rescue=info");
}

/// Initialize the global tracing subscriber, honoring `RUST_LOG` when set.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing_with_default(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
