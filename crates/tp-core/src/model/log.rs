//! Engine log records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of an engine log record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
    Silent,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Silent => write!(f, "silent"),
        }
    }
}

/// A single record from the engine's log feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub time: u64,
}

impl LogMessage {
    pub fn new(level: LogLevel, message: impl Into<String>, time: u64) -> Self {
        Self {
            level,
            message: message.into(),
            time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_accepts_warn_alias() {
        let level: LogLevel = serde_json::from_str(r#""warn""#).unwrap();
        assert_eq!(level, LogLevel::Warning);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
    }
}
