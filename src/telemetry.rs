//! Tracing setup for the CLI binary.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber on stderr.
///
/// Verbosity widens the default filter; `HS_LOG` overrides it entirely.
pub fn init(verbose: u8) {
    let default_directive = match verbose {
        0 => "homestead=warn",
        1 => "homestead=info",
        2 => "homestead=debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_env("HS_LOG").unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
