//! JSON-lines logger writing structured events to stderr.

use semindex_ports::{LogEvent, LogLevel, LoggerPort};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Mutex;

/// Minimal structured logger: one JSON object per line on stderr.
#[derive(Debug)]
pub struct JsonLineLogger {
    min_level: LogLevel,
    sink: Mutex<()>,
}

impl Default for JsonLineLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonLineLogger {
    /// Logger emitting `Info` and above.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_level: LogLevel::Info,
            sink: Mutex::new(()),
        }
    }

    /// Logger with an explicit minimum level.
    #[must_use]
    pub const fn with_min_level(min_level: LogLevel) -> Self {
        Self {
            min_level,
            sink: Mutex::new(()),
        }
    }

    fn render(event: &LogEvent) -> Value {
        let mut payload = json!({
            "event": event.event.as_ref(),
            "level": level_label(event.level),
            "message": event.message.as_ref(),
        });
        if let Some(fields) = event.fields.as_ref() {
            if let Some(object) = payload.as_object_mut() {
                for (key, value) in fields {
                    object.insert(key.as_ref().to_owned(), value.clone());
                }
            }
        }
        payload
    }
}

impl LoggerPort for JsonLineLogger {
    fn log(&self, event: LogEvent) {
        if level_rank(event.level) < level_rank(self.min_level) {
            return;
        }
        let payload = Self::render(&event);
        // Serialize writes so concurrent events stay line-atomic.
        let _guard = self.sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{payload}");
    }
}

const fn level_rank(level: LogLevel) -> u8 {
    match level {
        LogLevel::Debug => 0,
        LogLevel::Info => 1,
        LogLevel::Warn => 2,
        LogLevel::Error => 3,
    }
}

const fn level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}
