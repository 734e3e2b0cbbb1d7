//! `[logging]` section

use serde::{Deserialize, Serialize};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Ordered from quietest to most detailed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

const LEVELS: [LogLevel; 5] = [
    LogLevel::Error,
    LogLevel::Warn,
    LogLevel::Info,
    LogLevel::Debug,
    LogLevel::Trace,
];

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// `steps` levels more detailed, stopping at trace
    fn raised(self, steps: u8) -> Self {
        LEVELS[(self as usize + steps as usize).min(LEVELS.len() - 1)]
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for noticiero's own events
    pub level: LogLevel,
}

impl LoggingConfig {
    /// `EnvFilter` directives for the given number of `-v` flags.
    ///
    /// Each flag makes noticiero one level more detailed. Dependencies
    /// (reqwest, hyper, sled) stay at `warn` until the second flag and then
    /// follow one level per flag.
    pub fn filter_directives(&self, verbose: u8) -> String {
        let own = self.level.raised(verbose);
        let dependencies = LogLevel::Warn.raised(verbose.saturating_sub(1));
        format!("noticiero={},{}", own.directive(), dependencies.directive())
    }
}
