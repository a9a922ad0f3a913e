//! Run log: structured record of every step of a collection run
//!
//! Components receive an [`EventSink`] instead of writing to a global log.
//! [`RunLog`] mirrors each event to `tracing` and, when file-backed, rewrites
//! its JSON document after every append so an interrupted run still leaves a
//! complete record behind.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Severity of a run log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One run log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

/// On-disk shape of the run log
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LogDocument {
    pub logs: Vec<LogEntry>,
}

/// Receiver for run events
pub trait EventSink: Send + Sync {
    fn record(&self, level: LogLevel, message: &str);

    fn info(&self, message: &str) {
        self.record(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.record(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.record(LogLevel::Error, message);
    }
}

/// Ordered run log, optionally persisted as JSON
pub struct RunLog {
    path: Option<PathBuf>,
    entries: Mutex<Vec<LogEntry>>,
}

impl RunLog {
    /// Run log persisted to `path` after every append
    pub fn to_file(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Run log kept only in memory
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of all entries recorded so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Read a persisted run log back
    pub fn load(path: impl AsRef<Path>) -> Result<LogDocument> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Write the document atomically (write tmp, rename)
    fn persist(path: &Path, entries: &[LogEntry]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let document = LogDocument {
            logs: entries.to_vec(),
        };
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(&document)?)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl EventSink for RunLog {
    fn record(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }

        let entry = LogEntry {
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            level,
            message: message.to_string(),
        };

        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.push(entry);

        if let Some(ref path) = self.path {
            if let Err(e) = Self::persist(path, &entries) {
                tracing::warn!("Failed to write run log {}: {}", path.display(), e);
            }
        }
    }
}
