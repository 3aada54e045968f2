//! Logging setup

use tracing_subscriber::EnvFilter;

/// Filter directive for this crate at `level`, e.g. `onex_reducer=debug`.
pub fn filter_directive(level: &str) -> String {
    format!("onex_reducer={}", level.to_lowercase())
}

/// Initialize logging to stderr. `RUST_LOG` wins over `level` when set.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
