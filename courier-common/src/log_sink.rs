//! Host-supplied log sink for batch notifications.
//!
//! Notification outcomes are reported to an optional [`LogSink`] owned by the
//! host application, separately from the crate's own `tracing` diagnostics.
//! Every message is prefixed with its [`LogType`].

use std::{error::Error, sync::Arc};

use parking_lot::Mutex;

/// Severity of a notification log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogType {
    Error,
    Warning,
    Information,
}

impl LogType {
    /// The literal prefix written in front of every message.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Error => "Error: ",
            Self::Warning => "Warning: ",
            Self::Information => "Information: ",
        }
    }
}

/// Destination for notification log entries.
pub trait LogSink: Send + Sync {
    fn error(&self, message: &str);
    fn error_with(&self, message: &str, cause: &(dyn Error + 'static));
    fn warn(&self, message: &str);
    fn warn_with(&self, message: &str, cause: &(dyn Error + 'static));
    fn info(&self, message: &str);
    fn info_with(&self, message: &str, cause: &(dyn Error + 'static));
}

/// Writes a prefixed entry to `sink`, doing nothing when no sink is configured.
pub fn write(sink: Option<&dyn LogSink>, log_type: LogType, message: &str) {
    let Some(sink) = sink else {
        return;
    };

    let message = format!("{}{message}", log_type.prefix());
    match log_type {
        LogType::Error => sink.error(&message),
        LogType::Warning => sink.warn(&message),
        LogType::Information => sink.info(&message),
    }
}

/// As [`write`], attaching the error that caused the entry.
pub fn write_with(
    sink: Option<&dyn LogSink>,
    log_type: LogType,
    message: &str,
    cause: &(dyn Error + 'static),
) {
    let Some(sink) = sink else {
        return;
    };

    let message = format!("{}{message}", log_type.prefix());
    match log_type {
        LogType::Error => sink.error_with(&message, cause),
        LogType::Warning => sink.warn_with(&message, cause),
        LogType::Information => sink.info_with(&message, cause),
    }
}

/// Forwards notification entries to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn error(&self, message: &str) {
        tracing::error!(target: "courier::notification", "{message}");
    }

    fn error_with(&self, message: &str, cause: &(dyn Error + 'static)) {
        tracing::error!(target: "courier::notification", error = %cause, "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "courier::notification", "{message}");
    }

    fn warn_with(&self, message: &str, cause: &(dyn Error + 'static)) {
        tracing::warn!(target: "courier::notification", error = %cause, "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "courier::notification", "{message}");
    }

    fn info_with(&self, message: &str, cause: &(dyn Error + 'static)) {
        tracing::info!(target: "courier::notification", error = %cause, "{message}");
    }
}

/// A recorded entry in a [`MemoryLogSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub log_type: LogType,
    pub message: String,
    pub cause: Option<String>,
}

/// Keeps every entry in memory, for hosts that report the batch log
/// somewhere other than `tracing` once the batch completes.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the entries recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Entries of the given severity.
    #[must_use]
    pub fn entries_of(&self, log_type: LogType) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.log_type == log_type)
            .cloned()
            .collect()
    }

    fn push(&self, log_type: LogType, message: &str, cause: Option<&(dyn Error + 'static)>) {
        self.entries.lock().push(LogEntry {
            log_type,
            message: message.to_string(),
            cause: cause.map(ToString::to_string),
        });
    }
}

impl LogSink for MemoryLogSink {
    fn error(&self, message: &str) {
        self.push(LogType::Error, message, None);
    }

    fn error_with(&self, message: &str, cause: &(dyn Error + 'static)) {
        self.push(LogType::Error, message, Some(cause));
    }

    fn warn(&self, message: &str) {
        self.push(LogType::Warning, message, None);
    }

    fn warn_with(&self, message: &str, cause: &(dyn Error + 'static)) {
        self.push(LogType::Warning, message, Some(cause));
    }

    fn info(&self, message: &str) {
        self.push(LogType::Information, message, None);
    }

    fn info_with(&self, message: &str, cause: &(dyn Error + 'static)) {
        self.push(LogType::Information, message, Some(cause));
    }
}
