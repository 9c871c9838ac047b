//! Log domain types

use serde::{Deserialize, Serialize};

/// A log line emitted by the runner for one pipeline.
///
/// `id` is the de-duplication key: a pipeline never holds two entries with the
/// same id. `timestamp` is whatever the runner supplied; it is never invented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a level name, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "info" | "debug" => Some(LogLevel::Info),
            "success" => Some(LogLevel::Success),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Guess a level from free-form runner output.
    ///
    /// Anything mentioning an error or a failure is an error, everything else is info.
    pub fn infer(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("error") || lower.contains("failed") {
            LogLevel::Error
        } else {
            LogLevel::Info
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_level_from_message() {
        assert_eq!(LogLevel::infer("npm ERR! build failed"), LogLevel::Error);
        assert_eq!(LogLevel::infer("Error: missing module"), LogLevel::Error);
        assert_eq!(LogLevel::infer("Cloning repository..."), LogLevel::Info);
    }

    #[test]
    fn test_parse_level_aliases() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse(" success "), Some(LogLevel::Success));
        assert_eq!(LogLevel::parse("trace"), None);
    }

    #[test]
    fn test_log_event_omits_empty_optionals() {
        let log = LogEvent {
            id: "l1".to_string(),
            timestamp: None,
            level: LogLevel::Info,
            message: "hello".to_string(),
            stage: None,
        };

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "id": "l1", "level": "info", "message": "hello" })
        );
    }
}
