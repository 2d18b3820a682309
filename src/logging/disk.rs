//! Disk sink: JSON lines in a daily rotated file.
//!
//! Files are named `mongo-mcp.<date>.log`. Retention is enforced when the
//! sink activates and again whenever the date changes: files older than
//! `max_age_days` are removed, then the oldest files are removed until the
//! directory fits in `max_total_bytes`. Files are never compressed.

use crate::logging::{LogLevel, LogRecord, LogSink, Redactor, SinkError, SinkState, StateCell};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

pub const LOG_FILE_PREFIX: &str = "mongo-mcp";
pub const LOG_FILE_SUFFIX: &str = "log";

pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_RETENTION_BYTES: u64 = 1024 * 1024 * 1024;

/// How long and how much log data is kept on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age_days: u32,
    pub max_total_bytes: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_days: DEFAULT_RETENTION_DAYS,
            max_total_bytes: DEFAULT_RETENTION_BYTES,
        }
    }
}

/// One line in the log file, modelled on the MongoDB server log format.
#[derive(Serialize)]
struct DiskLine<'a> {
    t: String,
    s: &'static str,
    id: u32,
    ctx: &'a str,
    msg: String,
    sid: &'a str,
}

/// Open log file. Lines are handed to a dedicated writer thread; dropping
/// the guard flushes whatever is still queued.
struct DiskWriter {
    writer: NonBlocking,
    _guard: WorkerGuard,
    last_sweep: NaiveDate,
}

pub struct DiskSink {
    directory: PathBuf,
    retention: RetentionPolicy,
    redactor: Redactor,
    session_id: String,
    state: StateCell,
    writer: Mutex<Option<DiskWriter>>,
}

impl DiskSink {
    /// The directory is only created when the first record arrives.
    pub fn new(
        directory: impl Into<PathBuf>,
        retention: RetentionPolicy,
        redactor: Redactor,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            retention,
            redactor,
            session_id: session_id.into(),
            state: StateCell::new(SinkState::Uninitialized),
            writer: Mutex::new(None),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// MongoDB server log severities.
    pub fn severity(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Debug => "D1",
            LogLevel::Info | LogLevel::Notice => "I",
            LogLevel::Warning => "W",
            LogLevel::Error => "E",
            LogLevel::Critical | LogLevel::Alert | LogLevel::Emergency => "F",
        }
    }

    /// Create the directory and the rolling appender on a blocking thread.
    async fn activate(&self) -> Result<DiskWriter, SinkError> {
        let directory = self.directory.clone();
        let appender = tokio::task::spawn_blocking(move || -> Result<RollingFileAppender, SinkError> {
            fs::create_dir_all(&directory)?;
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix(LOG_FILE_SUFFIX)
                .build(&directory)
                .map_err(|e| SinkError::Unavailable(e.to_string()))
        })
        .await
        .map_err(|e| SinkError::Unavailable(e.to_string()))??;

        self.spawn_sweep();
        let (writer, guard) = tracing_appender::non_blocking(appender);
        Ok(DiskWriter {
            writer,
            _guard: guard,
            last_sweep: Utc::now().date_naive(),
        })
    }

    /// Apply retention in the background; failures are only reported.
    fn spawn_sweep(&self) {
        let directory = self.directory.clone();
        let retention = self.retention;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = sweep_directory(&directory, &retention, SystemTime::now()) {
                tracing::warn!(error = %e, "Log retention sweep failed");
            }
        });
    }

    fn format(&self, record: &LogRecord) -> Result<String, SinkError> {
        let line = DiskLine {
            t: record.timestamp.to_rfc3339(),
            s: Self::severity(record.level),
            id: record.id.0,
            ctx: &record.context,
            msg: self.redactor.redact(&record.message),
            sid: &self.session_id,
        };
        serde_json::to_string(&line).map_err(|e| SinkError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl LogSink for DiskSink {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn state(&self) -> SinkState {
        self.state.get()
    }

    async fn log(&self, record: &LogRecord) -> Result<(), SinkError> {
        let line = self.format(record)?;
        let mut guard = self.writer.lock().await;

        if guard.is_none() {
            match self.activate().await {
                Ok(writer) => {
                    *guard = Some(writer);
                    self.state.set(SinkState::Active);
                }
                Err(e) => {
                    self.state.set(SinkState::Failed);
                    return Err(e);
                }
            }
        }
        let Some(writer) = guard.as_mut() else {
            return Err(SinkError::Unavailable("disk writer missing".into()));
        };

        let today = record.timestamp.date_naive();
        if today != writer.last_sweep {
            writer.last_sweep = today;
            self.spawn_sweep();
        }

        // Only enqueues the line for the writer thread.
        writeln!(writer.writer, "{line}")?;
        Ok(())
    }

    /// Flush queued lines and release the file. A later record reopens it.
    async fn close(&self) {
        let Some(writer) = self.writer.lock().await.take() else {
            return;
        };
        // Dropping the guard waits for the writer thread to drain.
        if let Err(e) = tokio::task::spawn_blocking(move || drop(writer)).await {
            tracing::warn!(error = %e, "Failed to flush disk log");
        }
        if self.state.get() == SinkState::Active {
            self.state.set(SinkState::Uninitialized);
        }
    }
}

/// Apply the retention policy to the log files in `directory`.
///
/// The newest file is always kept. Returns the number of removed files.
pub fn sweep_directory(
    directory: &Path,
    policy: &RetentionPolicy,
    now: SystemTime,
) -> io::Result<usize> {
    let mut files = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(LOG_FILE_PREFIX) || !name.ends_with(LOG_FILE_SUFFIX) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(now);
        files.push((entry.path(), modified, meta.len()));
    }

    // Newest first.
    files.sort_by(|a, b| b.1.cmp(&a.1));

    let max_age = Duration::from_secs(u64::from(policy.max_age_days) * 24 * 60 * 60);
    let mut removed = 0;
    let mut total: u64 = 0;

    for (index, (path, modified, len)) in files.iter().enumerate() {
        let age = now.duration_since(*modified).unwrap_or_default();
        let too_old = age > max_age;
        let over_budget = total + len > policy.max_total_bytes;

        if index > 0 && (too_old || over_budget) {
            fs::remove_file(path)?;
            removed += 1;
        } else {
            total += len;
        }
    }

    Ok(removed)
}
