//! Tracing subscriber setup for the binary

use tracing_subscriber::EnvFilter;

/// Map a `-v` count to a default filter directive
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "sub_collector=info",
        1 => "sub_collector=debug",
        _ => "sub_collector=trace",
    }
}

/// Install a fmt subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `verbosity` when set.
pub fn init(verbosity: u8) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))
}
