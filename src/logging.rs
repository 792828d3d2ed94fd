//! Diagnostic logging setup
//!
//! Logs go to stderr so stdout stays clean for the report (and `--json`).

use crate::types::SyncError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter directive for a `-v` count
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the verbosity flag
pub fn init(verbosity: u8) -> Result<(), SyncError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbosity)))
        .map_err(|e| SyncError::Config(format!("invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 1)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| SyncError::Config(format!("logging already initialized: {}", e)))
}
