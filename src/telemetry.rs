//! Logging initialisation
//!
//! The router itself only emits `tracing` events; installing a subscriber is
//! left to the application. [`init_logging_with_config`] is the stock setup:
//! an `EnvFilter`, a JSON or pretty `fmt` layer and, optionally, a
//! non-blocking writer so that dispatch never waits on stdout.
//!
//! Configuration comes from `MQROUTE_LOG_*` environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `MQROUTE_LOG_LEVEL` | `info` |
//! | `MQROUTE_LOG_FORMAT` | `json` |
//! | `MQROUTE_LOG_TARGET_FILTER` | unset (comma-separated directives) |
//! | `MQROUTE_LOG_INCLUDE_LOCATION` | `false` |
//! | `MQROUTE_LOG_ASYNC` | `true` |
//!
//! `RUST_LOG`, when set, takes precedence over `MQROUTE_LOG_LEVEL`.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Extra `EnvFilter` directives, comma-separated
    pub target_filter: Option<String>,
    /// Include file:line location (dev only)
    pub include_location: bool,
    /// Write through a background thread
    pub async_logging: bool,
}

impl LogConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };
        Self {
            log_level: lookup("MQROUTE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            format: LogFormat::parse(
                &lookup("MQROUTE_LOG_FORMAT").unwrap_or_else(|| "json".to_string()),
            ),
            target_filter: lookup("MQROUTE_LOG_TARGET_FILTER"),
            include_location: flag("MQROUTE_LOG_INCLUDE_LOCATION", false),
            async_logging: flag("MQROUTE_LOG_ASYNC", true),
        }
    }

    /// Synchronous, pretty, debug-level logging
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            target_filter: None,
            include_location: true,
            async_logging: false,
        }
    }

    #[must_use]
    pub fn default_prod() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            target_filter: None,
            include_location: false,
            async_logging: true,
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.log_level)
                .with_context(|| format!("Invalid log level '{}'", self.log_level))?,
        };
        if let Some(targets) = &self.target_filter {
            for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(d) => filter = filter.add_directive(d),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {}", directive),
                }
            }
        }
        Ok(filter)
    }
}

/// Initialise logging from `MQROUTE_LOG_*` variables.
pub fn init_logging() -> Result<Option<WorkerGuard>> {
    init_logging_with_config(&LogConfig::from_env())
}

/// Install the global subscriber described by `config`.
///
/// With async logging the returned guard must be kept alive for as long as
/// logs should be flushed; dropping it stops the writer thread.
pub fn init_logging_with_config(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let (writer, guard) = if config.async_logging {
        let (nb, guard) = tracing_appender::non_blocking(std::io::stdout());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(nb), Some(guard))
    } else {
        (
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout),
            None,
        )
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Json);
    }

    #[test]
    fn test_log_config_defaults_from_empty_env() {
        let config = LogConfig::from_lookup(|_| None);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.async_logging);
        assert!(!config.include_location);
        assert!(config.target_filter.is_none());
    }

    #[test]
    fn test_log_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("MQROUTE_LOG_LEVEL", "debug"),
            ("MQROUTE_LOG_FORMAT", "pretty"),
            ("MQROUTE_LOG_ASYNC", "false"),
            ("MQROUTE_LOG_INCLUDE_LOCATION", "maybe"),
            ("MQROUTE_LOG_TARGET_FILTER", "mqroute::access=warn"),
        ]
        .into_iter()
        .collect();
        let config = LogConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(!config.async_logging);
        assert!(!config.include_location);
        assert_eq!(config.target_filter.as_deref(), Some("mqroute::access=warn"));
    }

    #[test]
    fn test_dev_and_prod_presets() {
        let dev = LogConfig::default_dev();
        assert_eq!(dev.format, LogFormat::Pretty);
        assert!(!dev.async_logging);

        let prod = LogConfig::default_prod();
        assert_eq!(prod.format, LogFormat::Json);
        assert!(prod.async_logging);
    }
}
