//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the configured level, so a single
//! module can be turned up without touching the rest.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// `log_format` is `"json"` for one JSON object per line, anything else for
/// human-readable text.
///
/// # Errors
///
/// Returns an error if `log_level` is not a valid filter directive or a
/// global subscriber is already installed.
pub fn init_tracing(log_level: &str, log_format: &str) -> Result<()> {
    let filter = build_filter(log_level)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if log_format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}

fn build_filter(log_level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|e| anyhow!("Invalid log level '{log_level}': {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_build_filter_from_level() {
        // SAFETY: Tests touching the environment run serially via #[serial]
        unsafe {
            std::env::remove_var("RUST_LOG");
        }

        assert!(build_filter("debug").is_ok());
        assert!(build_filter("shortlink=trace,redis=warn").is_ok());
        assert!(build_filter("shortlink=loud").is_err());
    }

    #[test]
    #[serial]
    fn test_rust_log_wins() {
        // SAFETY: serialized
        unsafe {
            std::env::set_var("RUST_LOG", "warn");
        }

        // The configured level is ignored, even when it would not parse.
        assert!(build_filter("shortlink=loud").is_ok());

        // SAFETY: serialized
        unsafe {
            std::env::remove_var("RUST_LOG");
        }
    }
}
