use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Logs go to stderr so command reports on stdout stay machine-readable.
/// `SAFRAN_LOG` wins over `RUST_LOG`, which wins over `-v` flags.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env("SAFRAN_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
