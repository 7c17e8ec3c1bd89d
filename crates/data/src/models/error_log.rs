//! Error-log trail for terminal failures.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    Info,
    Error,
}

impl LogKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogKind::Info => "info",
            LogKind::Error => "error",
        }
    }
}

/// One entry in `error_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ErrorLogRecord {
    pub title: String,
    pub message: String,
    /// Component or entity the failure concerns (e.g., "stream", "signal")
    pub entity: String,
    pub kind: String,
}

impl ErrorLogRecord {
    pub fn error(
        title: impl Into<String>,
        message: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            entity: entity.into(),
            kind: LogKind::Error.as_str().to_string(),
        }
    }
}
