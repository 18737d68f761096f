//! Log sink setup.
//!
//! rfunc emits `tracing` events; this module installs a subscriber that
//! writes them to stdout, stderr and/or a file, with whole levels
//! suppressible. Applications that already install their own subscriber
//! can ignore it.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::RfuncError;

/// Severity names used in configuration, mapped onto `tracing` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Verbose,
    Info,
    Warning,
    Exception,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Verbose,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Exception,
    ];

    pub fn as_tracing(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Verbose => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Exception => Level::ERROR,
        }
    }

    pub fn from_tracing(level: Level) -> Self {
        match level {
            Level::TRACE => LogLevel::Trace,
            Level::DEBUG => LogLevel::Verbose,
            Level::INFO => LogLevel::Info,
            Level::WARN => LogLevel::Warning,
            _ => LogLevel::Exception,
        }
    }
}

/// Where log output goes and which levels are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Levels that are never written, regardless of `RUST_LOG`.
    pub suppressed: Vec<LogLevel>,
    /// Default: true.
    pub stdout: bool,
    /// Default: false.
    pub stderr: bool,
    /// Append-only log file. Created if missing.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            suppressed: Vec::new(),
            stdout: true,
            stderr: false,
            file: None,
        }
    }
}

impl LogConfig {
    pub fn suppress(mut self, level: LogLevel) -> Self {
        if !self.suppressed.contains(&level) {
            self.suppressed.push(level);
        }
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn is_suppressed(&self, level: Level) -> bool {
        self.suppressed.contains(&LogLevel::from_tracing(level))
    }
}

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG` sets the verbosity (falling back to `info`); suppressed
/// levels are removed on top of that.
///
/// # Errors
/// [`RfuncError::Logging`] if the log file cannot be opened or a global
/// subscriber is already set.
pub fn init(config: &LogConfig) -> Result<(), RfuncError> {
    let suppressed = config.suppressed.clone();
    let allowed =
        filter_fn(move |meta| !suppressed.contains(&LogLevel::from_tracing(*meta.level())));

    let stdout = config
        .stdout
        .then(|| fmt::layer().with_writer(std::io::stdout));
    let stderr = config
        .stderr
        .then(|| fmt::layer().with_writer(std::io::stderr));
    let file = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    RfuncError::Logging(format!("cannot open {}: {e}", path.display()))
                })?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(stdout.map(|l| l.with_filter(allowed.clone())))
        .with(stderr.map(|l| l.with_filter(allowed.clone())))
        .with(file.map(|l| l.with_filter(allowed)))
        .try_init()
        .map_err(|e| RfuncError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping_round_trips() {
        for level in LogLevel::ALL {
            assert_eq!(LogLevel::from_tracing(level.as_tracing()), level);
        }
        assert_eq!(LogLevel::Verbose.as_tracing(), Level::DEBUG);
        assert_eq!(LogLevel::Exception.as_tracing(), Level::ERROR);
    }

    #[test]
    fn test_suppression() {
        let config = LogConfig::default()
            .suppress(LogLevel::Trace)
            .suppress(LogLevel::Trace)
            .suppress(LogLevel::Warning);
        assert_eq!(config.suppressed.len(), 2);
        assert!(config.is_suppressed(Level::TRACE));
        assert!(config.is_suppressed(Level::WARN));
        assert!(!config.is_suppressed(Level::ERROR));
    }

    #[test]
    fn test_log_config_from_json() {
        let config: LogConfig =
            serde_json::from_str(r#"{ "suppressed": ["verbose"], "stderr": true }"#).unwrap();
        assert_eq!(config.suppressed, vec![LogLevel::Verbose]);
        assert!(config.stdout);
        assert!(config.stderr);
        assert_eq!(config.file, None);
    }

    #[test]
    fn test_unopenable_file_is_logging_error() {
        let config = LogConfig::default().with_file("/nonexistent-dir/rfunc.log");
        assert!(matches!(init(&config), Err(RfuncError::Logging(_))));
    }
}
