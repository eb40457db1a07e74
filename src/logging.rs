//! Logging setup shared by the binaries

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Logs go to stderr so stdout carries only the exchange. `RUST_LOG` overrides
/// the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,textgen=info,textgen_context=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
