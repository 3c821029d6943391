//! Structured logging boundary contract.

use std::collections::BTreeMap;

/// Severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug.
    Debug,
    /// Info.
    Info,
    /// Warn.
    Warn,
    /// Error.
    Error,
}

/// Structured event fields.
pub type LogFields = BTreeMap<Box<str>, serde_json::Value>;

/// One structured log event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// Stable event name (e.g. `index.scan.dir_read_failed`).
    pub event: Box<str>,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: Box<str>,
    /// Structured fields.
    pub fields: Option<LogFields>,
}

/// Boundary contract for structured logging.
pub trait LoggerPort: Send + Sync {
    /// Emit an event.
    fn log(&self, event: LogEvent);

    /// Convenience: debug event.
    fn debug(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(LogEvent {
            event: event.into(),
            level: LogLevel::Debug,
            message: message.into(),
            fields,
        });
    }

    /// Convenience: info event.
    fn info(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(LogEvent {
            event: event.into(),
            level: LogLevel::Info,
            message: message.into(),
            fields,
        });
    }

    /// Convenience: warn event.
    fn warn(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(LogEvent {
            event: event.into(),
            level: LogLevel::Warn,
            message: message.into(),
            fields,
        });
    }

    /// Convenience: error event.
    fn error(&self, event: &str, message: &str, fields: Option<LogFields>) {
        self.log(LogEvent {
            event: event.into(),
            level: LogLevel::Error,
            message: message.into(),
            fields,
        });
    }
}
