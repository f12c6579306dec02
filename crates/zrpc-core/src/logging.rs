//! Tracing integration for structured logging.
//!
//! Both the library and any embedding tool log through `tracing`; this
//! module wires up a subscriber with configurable verbosity, optional
//! file output, and text or JSON format.

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::Result;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Initialize the logging system.
///
/// `verbosity` maps 0=error, 1=warn, 2=info, 3=debug, 4+=trace; the
/// `RUST_LOG` environment variable overrides it when set. When `log_file`
/// is given, output is appended there without ANSI colors.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>, format: LogFormat) -> Result<()> {
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("zrpc_core={level},zrpc_client={level}"))
    });

    let registry = tracing_subscriber::registry().with(filter);
    fn init_err(e: impl std::fmt::Display) -> crate::Error {
        crate::Error::Io(std::io::Error::other(e.to_string()))
    }

    match (log_file, format) {
        (None, LogFormat::Text) => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(verbosity >= 3)
                    .with_line_number(verbosity >= 3),
            )
            .try_init()
            .map_err(init_err)?,
        (None, LogFormat::Json) => registry
            .with(fmt::layer().json())
            .try_init()
            .map_err(init_err)?,
        (Some(path), format) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            match format {
                LogFormat::Text => registry
                    .with(fmt::layer().with_writer(file).with_ansi(false).with_target(true))
                    .try_init()
                    .map_err(init_err)?,
                LogFormat::Json => registry
                    .with(fmt::layer().json().with_writer(file))
                    .try_init()
                    .map_err(init_err)?,
            }
        }
    }

    Ok(())
}

/// Initialize logging with defaults for testing.
///
/// Uses info level with text format to stderr. Silently ignores errors
/// (logging may already be initialized).
pub fn init_test_logging() {
    let _ = init_logging(2, None, LogFormat::Text);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn init_is_idempotent_for_tests() {
        // The subscriber can only be installed once per process; the test
        // helper must tolerate repeated calls.
        init_test_logging();
        init_test_logging();
    }
}
