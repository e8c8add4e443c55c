use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global tracing subscriber. Logs go to stderr so command output
/// on stdout stays machine-readable. `RUST_LOG` overrides the default filter.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "ledgerbank=debug,info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .init();
}
