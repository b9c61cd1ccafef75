// src/logging.rs

//! Logging setup for `watchpool` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from, in order: the `--log-level` flag, the
//! `WATCHPOOL_LOG` environment variable (full `EnvFilter` directives such as
//! `watchpool::handle=debug,info`), then `info`.
//!
//! Output goes to stderr; stdout is reserved for change events.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "WATCHPOOL_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// The CLI level wins over `env_directives`; malformed directives are an
/// error rather than silently ignored.
pub fn build_filter(cli_level: Option<LogLevel>, env_directives: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(level.as_directive()));
    }
    match env_directives.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid {LOG_ENV} value {directives:?}")),
        None => Ok(EnvFilter::new("info")),
    }
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_overrides_environment() {
        let filter = build_filter(Some(LogLevel::Debug), Some("error")).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn environment_directives_are_used() {
        let filter = build_filter(None, Some("watchpool::handle=trace")).unwrap();
        assert_eq!(filter.to_string(), "watchpool::handle=trace");
    }

    #[test]
    fn blank_environment_falls_back_to_info() {
        assert_eq!(build_filter(None, Some("  ")).unwrap().to_string(), "info");
        assert_eq!(build_filter(None, None).unwrap().to_string(), "info");
    }

    #[test]
    fn malformed_directives_are_rejected() {
        assert!(build_filter(None, Some("watchpool=notalevel")).is_err());
    }
}
