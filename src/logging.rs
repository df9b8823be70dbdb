// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Severity of a log entry, from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    /// Noteworthy for the user, but not a problem
    Note,
    Warn,
    Error,
    /// The application cannot continue in a meaningful way
    Fatal,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Note => "note",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Destination for log entries.
///
/// Implementations can forward to `tracing`, show notifications in a UI or
/// collect entries for inspection.
pub trait LogAppender: Send + Sync {
    fn log(&self, level: LogLevel, module: &str, message: &str);
}

/// A shared reference to a log appender
pub type SharedLogAppender = Arc<dyn LogAppender>;

/// Forwards entries to the `tracing` macros.
///
/// `note` and `fatal` have no tracing counterpart; they are emitted at info
/// and error level with a marker field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAppender;

impl LogAppender for TracingAppender {
    fn log(&self, level: LogLevel, module: &str, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(module, "{message}"),
            LogLevel::Info => tracing::info!(module, "{message}"),
            LogLevel::Note => tracing::info!(module, note = true, "{message}"),
            LogLevel::Warn => tracing::warn!(module, "{message}"),
            LogLevel::Error => tracing::error!(module, "{message}"),
            LogLevel::Fatal => tracing::error!(module, fatal = true, "{message}"),
        }
    }
}

/// A single captured log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub module: String,
    pub message: String,
}

/// Keeps every entry in memory
#[derive(Debug, Default)]
pub struct MemoryAppender {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryAppender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries logged so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Entries with at least the given severity
    pub fn entries_at_least(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.level >= level)
            .collect()
    }
}

impl LogAppender for MemoryAppender {
    fn log(&self, level: LogLevel, module: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                level,
                module: module.to_string(),
                message: message.to_string(),
            });
        }
    }
}

/// Module-scoped handle for writing log entries to an appender
#[derive(Clone)]
pub struct Logger {
    module: String,
    appender: SharedLogAppender,
}

impl Logger {
    pub fn new(module: impl Into<String>, appender: SharedLogAppender) -> Self {
        Self {
            module: module.into(),
            appender,
        }
    }

    /// Logger writing to `tracing`
    pub fn tracing(module: impl Into<String>) -> Self {
        Self::new(module, Arc::new(TracingAppender))
    }

    /// Same appender, different module name
    pub fn for_module(&self, module: impl Into<String>) -> Self {
        Self::new(module, self.appender.clone())
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        self.appender.log(level, &self.module, message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    pub fn note(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Note, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    pub fn fatal(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Fatal, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::tracing("podcatcher")
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("module", &self.module).finish()
    }
}
