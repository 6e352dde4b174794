//! Progress reporting used by the pipeline and its stages.

use std::sync::{Arc, Mutex};

use tracing::{error, info};

/// Structured, human-readable progress reporter.
pub trait Logger: Send + Sync {
    fn section(&self, title: &str);
    fn subsection(&self, title: &str);
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    fn check_ok(&self, message: &str);
    fn check_error(&self, message: &str);
}

/// Forwards every report to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn section(&self, title: &str) {
        info!(section = title, "==== {title} ====");
    }

    fn subsection(&self, title: &str) {
        info!(stage = title, "---- {title} ----");
    }

    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }

    fn check_ok(&self, message: &str) {
        info!(check = "ok", "{message}");
    }

    fn check_error(&self, message: &str) {
        error!(check = "failed", "{message}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Section,
    Subsection,
    Info,
    Error,
    CheckOk,
    CheckError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// Keeps every report in memory. Clones share the same record buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogger {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Whether any record at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|record| record.level == level && record.message.contains(needle))
    }

    fn push(&self, level: LogLevel, message: &str) {
        if let Ok(mut guard) = self.records.lock() {
            guard.push(LogRecord {
                level,
                message: message.to_string(),
            });
        }
    }
}

impl Logger for MemoryLogger {
    fn section(&self, title: &str) {
        self.push(LogLevel::Section, title);
    }

    fn subsection(&self, title: &str) {
        self.push(LogLevel::Subsection, title);
    }

    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }

    fn check_ok(&self, message: &str) {
        self.push(LogLevel::CheckOk, message);
    }

    fn check_error(&self, message: &str) {
        self.push(LogLevel::CheckError, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_logger_clones_share_records() {
        let logger = MemoryLogger::new();
        let handle = logger.clone();
        logger.subsection("Fetch step");
        logger.check_error("Unable to locate 'git'");

        assert_eq!(handle.records().len(), 2);
        assert!(handle.contains(LogLevel::CheckError, "git"));
        assert!(!handle.contains(LogLevel::Error, "git"));
    }
}
