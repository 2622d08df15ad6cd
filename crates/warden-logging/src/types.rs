//! Logging types shared across the crate.

use serde::{Deserialize, Serialize};

/// Log level with numeric mapping for `SQLite` filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detailed entry/exit points.
    Trace = 10,
    /// Intermediate values, decisions.
    Debug = 20,
    /// Outcomes, summaries (default persistence level).
    Info = 30,
    /// Non-fatal issues.
    Warn = 40,
    /// Errors.
    Error = 50,
}

impl LogLevel {
    /// Numeric value for SQL queries (higher = more severe).
    #[must_use]
    pub const fn as_num(self) -> i32 {
        self as i32
    }

    /// Convert from tracing level.
    #[must_use]
    pub fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }

    /// Convert from string (case-insensitive). Unknown → `Info`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A stored log row.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Row ID.
    pub id: i64,
    /// RFC 3339 timestamp, millisecond precision, UTC.
    pub timestamp: String,
    /// Log level.
    pub level: LogLevel,
    /// Numeric level for filtering.
    pub level_num: i32,
    /// Component (span field) or event target.
    pub component: String,
    /// Log message.
    pub message: String,
    /// Community in scope, from the span stack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community_id: Option<String>,
    /// Member in scope, from the span stack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    /// Message in scope, from the span stack.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Remaining event fields as a JSON object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// `error` field of the event, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Filters for [`crate::LogStore::query`].
#[derive(Clone, Debug, Default)]
pub struct LogQueryOptions {
    /// Minimum level.
    pub min_level: Option<LogLevel>,
    /// Exact community match.
    pub community_id: Option<String>,
    /// Exact member match.
    pub member_id: Option<String>,
    /// Exact component match.
    pub component: Option<String>,
    /// Only rows at or after this RFC 3339 timestamp.
    pub since: Option<String>,
    /// Substring match on the message.
    pub search: Option<String>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
    /// Newest first when true.
    pub newest_first: bool,
}
