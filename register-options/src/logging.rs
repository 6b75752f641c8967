//! Narrow logging interface used by the orchestrator and the write gate
//!
//! Logging is diagnostics only and never affects control flow.

use serde_json::Value;
use std::sync::{Mutex, PoisonError};

/// Diagnostic sink with a context payload per record
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str, context: &Value);
    fn warning(&self, message: &str, context: &Value);
    fn error(&self, message: &str, context: &Value);
}

/// Forwards records to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

const TARGET: &str = "register_options";

impl Logger for LogFacade {
    fn debug(&self, message: &str, context: &Value) {
        log::debug!(target: TARGET, "{} {}", message, context);
    }

    fn warning(&self, message: &str, context: &Value) {
        log::warn!(target: TARGET, "{} {}", message, context);
    }

    fn error(&self, message: &str, context: &Value) {
        log::error!(target: TARGET, "{} {}", message, context);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Warning,
    Error,
}

/// A captured log record
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub context: Value,
}

/// Keeps every record in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records whose message starts with `prefix`
    pub fn matching(&self, prefix: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.message.starts_with(prefix))
            .collect()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn push(&self, level: LogLevel, message: &str, context: &Value) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogRecord {
                level,
                message: message.to_string(),
                context: context.clone(),
            });
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str, context: &Value) {
        self.push(LogLevel::Debug, message, context);
    }

    fn warning(&self, message: &str, context: &Value) {
        self.push(LogLevel::Warning, message, context);
    }

    fn error(&self, message: &str, context: &Value) {
        self.push(LogLevel::Error, message, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recording_logger_keeps_order() {
        let logger = RecordingLogger::new();
        logger.debug("first", &json!({}));
        logger.warning("second", &json!({"key": "a"}));
        logger.error("third", &Value::Null);

        let records = logger.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].level, LogLevel::Debug);
        assert_eq!(records[1].context, json!({"key": "a"}));
        assert_eq!(records[2].message, "third");

        assert_eq!(logger.matching("sec").len(), 1);
        logger.clear();
        assert!(logger.records().is_empty());
    }
}
