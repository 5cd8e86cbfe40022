//! Subscriber setup for callers of the staking core
//!
//! Validation rejections, script construction and signature checks are
//! reported as `debug!`/`trace!` events under the `btcstaking_core` target.
//! Nothing here runs unless a binary or test asks for it:
//!
//! ```rust,ignore
//! use btcstaking_core::logging::{init_logging, LogLevel};
//!
//! init_logging("debug".parse()?, false)?;
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TARGET: &str = "btcstaking_core";

/// Verbosity for events emitted by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive enabling this crate's target at this level.
    pub fn directive(self) -> String {
        format!("{TARGET}={}", Level::from(self).as_str().to_ascii_lowercase())
    }
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

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            other => return Err(LoggingError::UnknownLevel(other.to_string())),
        };
        Ok(level)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Level::from(*self).as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Install a global subscriber.
///
/// `RUST_LOG` overrides `level` when set. Only one subscriber can be
/// installed per process; later calls return [`LoggingError::InitFailed`].
pub fn init_logging(level: LogLevel, json: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact().with_test_writer())
            .try_init()
    };

    installed.map_err(|e| LoggingError::InitFailed(e.to_string()))
}
