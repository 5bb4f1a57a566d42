//! Logger initialisation for the CLI.

use clap::ValueEnum;
use log::LevelFilter;

/// Log levels accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Everything, including parsed config values and URLs.
    Debug,
    /// Progress messages.
    Info,
    /// Warnings only.
    Warning,
    /// Errors only.
    Error,
    /// Alias for `error`; nothing logs above it.
    Critical,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::Debug,
            LogLevel::Info => Self::Info,
            LogLevel::Warning => Self::Warn,
            LogLevel::Error | LogLevel::Critical => Self::Error,
        }
    }
}

/// Install the `env_logger` backend at `level`.
///
/// `RUST_LOG` is applied on top, so individual modules can be raised or
/// silenced. The SDK crates stay at `warn` unless `RUST_LOG` says otherwise.
///
/// # Errors
///
/// Returns an error if a logger has already been installed.
pub fn init(level: LogLevel) -> Result<(), log::SetLoggerError> {
    env_logger::Builder::new()
        .filter_level(level.into())
        .filter_module("aws_config", LevelFilter::Warn)
        .filter_module("aws_smithy_runtime", LevelFilter::Warn)
        .filter_module("ureq", LevelFilter::Warn)
        .format_timestamp(None)
        .format_target(false)
        .parse_default_env()
        .try_init()
}
