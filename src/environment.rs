//! Shared runtime handle: options plus the logging facade.
//!
//! An [`Environment`] is cloned into every tunnel, nest and packer at
//! construction. Nothing in the crate reaches for global state besides the
//! `tracing` dispatcher behind [`TracingSink`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::config::Options;
use crate::error::ConfigError;
use crate::nest::{FolderNest, MemoryNest};
use crate::pack::Packer;
use crate::tunnel::Tunnel;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// One log call, as handed to a [`LogSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    /// The tunnel, nest or job doing the logging.
    pub actor: Option<String>,
    /// Anything else worth correlating with the message (usually job ids).
    pub related: Vec<String>,
}

/// Destination for log records. Implementations must not panic.
pub trait LogSink: Send + Sync {
    fn log(&self, record: &LogRecord);
}

/// Default sink: forwards every record to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, record: &LogRecord) {
        let actor = record.actor.as_deref().unwrap_or("-");
        let related = record.related.join(",");
        match record.level {
            LogLevel::Debug => {
                tracing::debug!(actor, related = %related, "{}", record.message)
            }
            LogLevel::Info => tracing::info!(actor, related = %related, "{}", record.message),
            LogLevel::Warning => {
                tracing::warn!(actor, related = %related, "{}", record.message)
            }
            LogLevel::Error => {
                tracing::error!(actor, related = %related, "{}", record.message)
            }
        }
    }
}

/// Sink that keeps records in memory; handy for hosts that surface
/// pipeline logs themselves, and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// True if any record at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }
}

struct EnvironmentInner {
    options: Options,
    sink: Arc<dyn LogSink>,
}

/// Cheap-to-clone handle over [`Options`] and the active [`LogSink`].
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Environment {
    pub fn new(options: Options) -> Self {
        Self::with_sink(options, Arc::new(TracingSink))
    }

    pub fn with_sink(options: Options, sink: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Arc::new(EnvironmentInner { options, sink }),
        }
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Fire-and-forget log call. Records below the configured
    /// `log_level` are dropped here.
    pub fn log(&self, level: LogLevel, message: impl Into<String>, actor: Option<&str>, related: &[&str]) {
        if level < self.inner.options.log_level {
            return;
        }
        let record = LogRecord {
            level,
            message: message.into(),
            actor: actor.map(str::to_owned),
            related: related.iter().map(|r| (*r).to_owned()).collect(),
        };
        self.inner.sink.log(&record);
    }

    pub fn debug(&self, message: impl Into<String>, actor: &str) {
        self.log(LogLevel::Debug, message, Some(actor), &[]);
    }

    pub fn info(&self, message: impl Into<String>, actor: &str) {
        self.log(LogLevel::Info, message, Some(actor), &[]);
    }

    pub fn warning(&self, message: impl Into<String>, actor: &str) {
        self.log(LogLevel::Warning, message, Some(actor), &[]);
    }

    pub fn error(&self, message: impl Into<String>, actor: &str) {
        self.log(LogLevel::Error, message, Some(actor), &[]);
    }

    pub fn tunnel(&self, name: impl Into<String>) -> Tunnel {
        Tunnel::new(name, self.clone())
    }

    pub fn folder_nest(&self, path: impl AsRef<Path>) -> FolderNest {
        FolderNest::new(path.as_ref(), self.clone())
    }

    /// Folder nest under `auto_managed_root`, created on demand.
    pub fn auto_folder_nest(&self, name: &str) -> Result<FolderNest, ConfigError> {
        let root = self.options().require_auto_root()?;
        let dir = root.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(FolderNest::new(&dir, self.clone()))
    }

    pub fn memory_nest(&self, name: impl Into<String>) -> MemoryNest {
        MemoryNest::new(name, self.clone())
    }

    pub fn packer(&self) -> Packer {
        Packer::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_below_threshold_are_dropped() {
        let sink = Arc::new(MemorySink::new());
        let options = Options {
            log_level: LogLevel::Warning,
            ..Default::default()
        };
        let env = Environment::with_sink(options, sink.clone());

        env.info("quiet", "tunnel:a");
        env.error("loud", "tunnel:a");

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "loud");
        assert_eq!(records[0].actor.as_deref(), Some("tunnel:a"));
    }

    #[test]
    fn related_ids_are_kept() {
        let sink = Arc::new(MemorySink::new());
        let env = Environment::with_sink(Options::default(), sink.clone());
        env.log(LogLevel::Info, "matched", None, &["a", "b"]);
        assert_eq!(sink.records()[0].related, vec!["a", "b"]);
    }

    #[test]
    fn auto_folder_nest_requires_root() {
        let env = Environment::default();
        let err = env.auto_folder_nest("inbox").unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption("auto_managed_root")));
    }

    #[test]
    fn auto_folder_nest_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let env = Environment::new(Options {
            auto_managed_root: Some(root.path().to_path_buf()),
            ..Default::default()
        });
        let nest = env.auto_folder_nest("inbox").unwrap();
        assert!(root.path().join("inbox").is_dir());
        assert_eq!(nest.dir(), root.path().join("inbox"));
    }

    #[test]
    fn log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert_eq!(LogLevel::Warning.to_string(), "warning");
    }
}
