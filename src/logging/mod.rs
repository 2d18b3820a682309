//! Application log records and their delivery sinks.
//!
//! Components report noteworthy events through a [`CompositeLogger`], which
//! fans every record out to independently failing sinks:
//! - `console`: re-emits records as `tracing` events (stderr)
//! - `disk`: JSON lines in a daily rotated file with retention
//! - `mcp`: `notifications/message` pushed to the attached MCP client
//!
//! Every sink redacts the message before delivering it.

pub mod composite;
pub mod console;
pub mod disk;
pub mod mcp;
pub mod redact;

pub use composite::CompositeLogger;
pub use console::ConsoleSink;
pub use disk::{DiskSink, RetentionPolicy};
pub use mcp::McpSink;
pub use redact::Redactor;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Debug,
            1 => Self::Info,
            2 => Self::Notice,
            3 => Self::Warning,
            4 => Self::Error,
            5 => Self::Critical,
            6 => Self::Alert,
            _ => Self::Emergency,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable numeric identifier of a log statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LogId(pub u32);

impl LogId {
    pub const SERVER_STARTED: LogId = LogId(1_000_001);
    pub const SERVER_STOPPED: LogId = LogId(1_000_002);
    pub const CLIENT_ATTACHED: LogId = LogId(1_000_003);
    pub const CONNECT_STARTED: LogId = LogId(1_001_001);
    pub const CONNECT_SUCCEEDED: LogId = LogId(1_001_002);
    pub const CONNECT_FAILED: LogId = LogId(1_001_003);
    pub const DISCONNECTED: LogId = LogId(1_001_004);
    pub const TOOL_EXECUTED: LogId = LogId(1_002_001);
    pub const TOOL_FAILED: LogId = LogId(1_002_002);
    pub const INDEX_CHECK_COLLSCAN: LogId = LogId(1_003_001);
    pub const INDEX_CHECK_FAILED: LogId = LogId(1_003_002);
    pub const ACCESS_LIST_UPDATED: LogId = LogId(1_004_001);
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single record flowing through the sinks.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub id: LogId,
    pub context: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(
        level: LogLevel,
        id: LogId,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            id,
            context: context.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle of a sink. Failed sinks are skipped by the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Uninitialized,
    Active,
    Failed,
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// A destination for log records.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Short name used when reporting delivery failures.
    fn name(&self) -> &'static str;

    fn state(&self) -> SinkState {
        SinkState::Active
    }

    async fn log(&self, record: &LogRecord) -> Result<(), SinkError>;

    /// Flush and release anything the sink holds open.
    async fn close(&self) {}
}

/// Lock-free holder for a [`SinkState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: SinkState) -> Self {
        Self(AtomicU8::new(Self::encode(state)))
    }

    pub(crate) fn get(&self) -> SinkState {
        match self.0.load(Ordering::Acquire) {
            0 => SinkState::Uninitialized,
            1 => SinkState::Active,
            _ => SinkState::Failed,
        }
    }

    pub(crate) fn set(&self, state: SinkState) {
        self.0.store(Self::encode(state), Ordering::Release);
    }

    fn encode(state: SinkState) -> u8 {
        match state {
            SinkState::Uninitialized => 0,
            SinkState::Active => 1,
            SinkState::Failed => 2,
        }
    }
}

/// Lock-free holder for a minimum [`LogLevel`].
#[derive(Debug)]
pub(crate) struct LevelCell(AtomicU8);

impl LevelCell {
    pub(crate) fn new(level: LogLevel) -> Self {
        Self(AtomicU8::new(level as u8))
    }

    pub(crate) fn get(&self) -> LogLevel {
        LogLevel::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn set(&self, level: LogLevel) {
        self.0.store(level as u8, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered_by_severity() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Alert < LogLevel::Emergency);
    }

    #[test]
    fn test_level_cell_round_trips_every_level() {
        let cell = LevelCell::new(LogLevel::Info);
        for level in [
            LogLevel::Debug,
            LogLevel::Notice,
            LogLevel::Critical,
            LogLevel::Emergency,
        ] {
            cell.set(level);
            assert_eq!(cell.get(), level);
        }
    }

    #[test]
    fn test_state_cell_transitions() {
        let cell = StateCell::new(SinkState::Uninitialized);
        assert_eq!(cell.get(), SinkState::Uninitialized);
        cell.set(SinkState::Active);
        assert_eq!(cell.get(), SinkState::Active);
        cell.set(SinkState::Failed);
        assert_eq!(cell.get(), SinkState::Failed);
    }

    #[test]
    fn test_level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warning).unwrap(), "\"warning\"");
    }
}
