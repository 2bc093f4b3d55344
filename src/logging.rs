//! Logging setup on top of `tracing`.
//!
//! The library only emits events; a binary (or test) opts in by calling
//! [`init_logging`] or [`init_with_config`]. Output goes to stderr so a JSON
//! report on stdout stays machine-readable.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: standard tracing filter, takes precedence
//! - `OVERHEAD_LOG_LEVEL`: error, warn, info, debug or trace
//! - `OVERHEAD_LOG_FORMAT`: `human` or `json`

use std::str::FromStr;
use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

const LOG_LEVEL_ENV: &str = "OVERHEAD_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "OVERHEAD_LOG_FORMAT";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Unknown level name.
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    /// Unknown format name.
    #[error("invalid log format: {0}")]
    InvalidLogFormat(String),

    /// Another global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Install(String),
}

/// Verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors (default).
    #[default]
    Warn,
    /// Progress messages.
    Info,
    /// Per-file detail.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(LoggingError::InvalidLogLevel(other.to_string())),
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable (default).
    #[default]
    Human,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(LoggingError::InvalidLogFormat(other.to_string())),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is unset.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Include file and line of each event.
    pub with_file_info: bool,
}

impl LoggingConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set the format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Include file and line information.
    pub fn with_file_info(mut self, enabled: bool) -> Self {
        self.with_file_info = enabled;
        self
    }

    /// Settings from `OVERHEAD_LOG_LEVEL` and `OVERHEAD_LOG_FORMAT`.
    pub fn from_env() -> Result<Self, LoggingError> {
        let mut config = Self::new();
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            config.level = level.parse()?;
        }
        if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
            config.format = format.parse()?;
        }
        Ok(config)
    }
}

/// Install the subscriber from environment variables.
///
/// Idempotent: only the first successful call installs anything.
pub fn init_logging() -> Result<(), LoggingError> {
    init_with_config(&LoggingConfig::from_env()?)
}

/// Install the subscriber with explicit settings. Idempotent.
pub fn init_with_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }
    let filter = build_env_filter(config.level)?;
    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_file(config.with_file_info)
                    .with_line_number(config.with_file_info),
            )
            .try_init(),
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(config.with_file_info)
                    .with_line_number(config.with_file_info),
            )
            .try_init(),
    };
    installed.map_err(|e| LoggingError::Install(e.to_string()))?;
    let _ = TRACING_INITIALIZED.set(());
    Ok(())
}

/// `RUST_LOG` first, then the configured level.
fn build_env_filter(level: LogLevel) -> Result<EnvFilter, LoggingError> {
    match std::env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::try_new(rust_log).map_err(|e| LoggingError::InvalidLogLevel(e.to_string())),
        Err(_) => Ok(EnvFilter::new(level.as_filter_str())),
    }
}
