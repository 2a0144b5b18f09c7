//! Structured diagnostics for a speed test run
//!
//! Every component (server list, selection, latency, transfers) owns a named
//! [`Logger`]. Loggers created by one [`LoggerFactory`] share a run id so a
//! JSON log can be grouped per invocation. Everything is written to stderr;
//! stdout only carries results (simple summaries, CSV rows or JSON reports).

use crate::error::AppError;
use crate::models::{Config, LatencyOutcome, TransferOutcome};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn paint(&self) -> String {
        let label = format!("{:>5}", self.as_str());
        match self {
            LogLevel::Debug => label.cyan().to_string(),
            LogLevel::Info => label.green().to_string(),
            LogLevel::Warn => label.yellow().to_string(),
            LogLevel::Error => label.red().bold().to_string(),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub logger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Named component logger; cheap to clone
#[derive(Debug, Clone)]
pub struct Logger {
    name: Arc<str>,
    /// `None` silences the logger entirely
    min_level: Option<LogLevel>,
    use_color: bool,
    json: bool,
    run_id: Option<Arc<str>>,
}

impl Logger {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            min_level: Some(LogLevel::Info),
            use_color: true,
            json: false,
            run_id: None,
        }
    }

    /// Logger that writes nothing, used by tests and embedders
    pub fn quiet(name: &str) -> Self {
        Self {
            min_level: None,
            use_color: false,
            ..Self::new(name)
        }
    }

    /// Level and format follow the run configuration.
    ///
    /// Machine-readable output modes only surface errors unless `--debug`
    /// is given, so a consumer parsing stdout sees nothing unexpected.
    pub fn with_config(name: &str, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Debug
        } else if config.output.is_silent() {
            LogLevel::Error
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        Self {
            name: name.into(),
            min_level: Some(min_level),
            use_color: config.enable_color,
            json: config.log_json,
            run_id: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        self.min_level.is_some_and(|min| level >= min)
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, LogLevel::Error, message)
    }

    fn render(&self, entry: &LogEntry) -> String {
        if self.json {
            return serde_json::to_string(entry)
                .unwrap_or_else(|_| format!("{{\"message\":{:?}}}", entry.message));
        }

        let level = if self.use_color {
            entry.level.paint()
        } else {
            format!("{:>5}", entry.level.as_str())
        };
        let mut line = format!(
            "{} {} [{}] {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            level,
            entry.logger,
            entry.message
        );

        if !entry.fields.is_empty() {
            let fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            line.push_str(&format!(" {{{}}}", fields.join(", ")));
        }
        line
    }

    async fn emit(&self, entry: LogEntry) {
        if !self.enabled(entry.level) {
            return;
        }

        let mut line = self.render(&entry);
        line.push('\n');

        let mut stderr = tokio::io::stderr();
        let _ = stderr.write_all(line.as_bytes()).await;
        let _ = stderr.flush().await;
    }
}

/// Accumulates fields for one entry; nothing is written until [`log`](Self::log)
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: &str) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                logger: logger.name.to_string(),
                run_id: logger.run_id.as_deref().map(str::to_string),
                message: message.to_string(),
                fields: BTreeMap::new(),
            },
        }
    }

    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        // Skip the serialization work for lines that will be dropped
        if self.logger.enabled(self.entry.level) {
            if let Ok(value) = serde_json::to_value(value) {
                self.entry.fields.insert(key.to_string(), value);
            }
        }
        self
    }

    pub fn latency(self, outcome: &LatencyOutcome) -> Self {
        self.field("ping_ms", outcome.avg_ms).field("jitter_ms", outcome.jitter_ms)
    }

    pub fn transfer(self, outcome: &TransferOutcome) -> Self {
        self.field("mbps", outcome.mbps).field("total_bytes", outcome.total_bytes)
    }

    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error", error.to_string())
            .field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
    }

    pub async fn log(self) {
        self.logger.emit(self.entry).await;
    }

    #[cfg(test)]
    fn entry(&self) -> &LogEntry {
        &self.entry
    }
}

/// Creates the component loggers of one run
pub struct LoggerFactory {
    template: Logger,
    run_id: Arc<str>,
}

impl LoggerFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            template: Logger::with_config("", config),
            run_id: Uuid::new_v4().simple().to_string().into(),
        }
    }

    pub fn create_logger(&self, name: &str) -> Logger {
        Logger {
            name: name.into(),
            run_id: Some(Arc::clone(&self.run_id)),
            ..self.template.clone()
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}
