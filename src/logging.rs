//! Logging System
//!
//! Structured logging built on the `tracing` crate. The library itself only
//! emits spans and events; this module carries the subscriber setup used by
//! the CLI and by embedding applications that want a ready-made
//! configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable colored output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            color: default_true(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("invalid log format '{0}' (expected 'text' or 'json')")]
    InvalidFormat(String),

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level so ad-hoc
/// debugging never requires editing configuration.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), LoggingError> {
    let default_config = LoggingConfig::default();
    let config = config.unwrap_or(&default_config);

    match config.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => {}
        other => return Err(LoggingError::InvalidLevel(other.to_string())),
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let use_stdout = config.output == "stdout";
    let timer = ChronoUtc::rfc_3339();

    match config.format.as_str() {
        "json" => {
            let layer = fmt::layer()
                .json()
                .with_timer(timer)
                .with_writer(move || -> Box<dyn std::io::Write> {
                    if use_stdout {
                        Box::new(std::io::stdout())
                    } else {
                        Box::new(std::io::stderr())
                    }
                });
            Registry::default()
                .with(filter)
                .with(layer)
                .try_init()
                .map_err(|e| LoggingError::Init(e.to_string()))
        }
        "text" => {
            let layer = fmt::layer()
                .with_timer(timer)
                .with_ansi(config.color)
                .with_writer(move || -> Box<dyn std::io::Write> {
                    if use_stdout {
                        Box::new(std::io::stdout())
                    } else {
                        Box::new(std::io::stderr())
                    }
                });
            Registry::default()
                .with(filter)
                .with(layer)
                .try_init()
                .map_err(|e| LoggingError::Init(e.to_string()))
        }
        other => Err(LoggingError::InvalidFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "text");
        assert!(config.color);
    }

    #[test]
    fn bad_level_is_rejected() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            init_logging(Some(&config)),
            Err(LoggingError::InvalidLevel(_))
        ));
    }

    #[test]
    fn bad_format_is_rejected() {
        let config = LoggingConfig {
            format: "yaml".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            init_logging(Some(&config)),
            Err(LoggingError::InvalidFormat(_))
        ));
    }
}
