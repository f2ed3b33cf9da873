//! Log output setup
//!
//! The store logs through the `log` macros. Embedders that have no subscriber
//! of their own can call `init_logging` to get console output, either pretty
//! or as JSON lines. `RUST_LOG` overrides the configured level.

use serde_derive::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: LogLevel,
    pub json_format: bool,
    /// With console output off nothing is printed at all
    pub console_output: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: LogLevel::Info,
            json_format: false,
            console_output: true,
        }
    }
}

fn level_filter(config: &LoggerConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{:?}", config.level).to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Returns false if one was already installed,
/// in which case the existing one stays in charge.
pub fn init_logging(config: &LoggerConfig) -> bool {
    let init_result = if config.console_output && config.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(level_filter(config))
            .try_init()
    } else if config.console_output {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(level_filter(config))
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("off"))
            .try_init()
    };

    match init_result {
        Ok(()) => true,
        Err(e) => {
            if config.console_output {
                eprintln!("Warning: Tracing subscriber already initialized: {}", e);
            }
            false
        }
    }
}
