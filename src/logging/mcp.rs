//! MCP sink: forwards records to the attached client as
//! `notifications/message`.

use crate::logging::{LevelCell, LogLevel, LogRecord, LogSink, Redactor, SinkError, SinkState, StateCell};
use async_trait::async_trait;
use rmcp::model::{LoggingLevel, LoggingMessageNotificationParam};
use rmcp::{Peer, RoleServer, ServiceError};
use std::sync::RwLock;

pub struct McpSink {
    peer: RwLock<Option<Peer<RoleServer>>>,
    min_level: LevelCell,
    redactor: Redactor,
    state: StateCell,
}

impl McpSink {
    pub fn new(redactor: Redactor) -> Self {
        Self {
            peer: RwLock::new(None),
            min_level: LevelCell::new(LogLevel::Info),
            redactor,
            state: StateCell::new(SinkState::Uninitialized),
        }
    }

    /// Start pushing records to `peer`. Replaces any previous client.
    pub fn attach(&self, peer: Peer<RoleServer>) {
        if let Ok(mut guard) = self.peer.write() {
            *guard = Some(peer);
            self.state.set(SinkState::Active);
        }
    }

    pub fn detach(&self) {
        if let Ok(mut guard) = self.peer.write() {
            *guard = None;
            self.state.set(SinkState::Uninitialized);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.peer.read().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Applied from the client's `logging/setLevel` request.
    pub fn set_min_level(&self, level: LogLevel) {
        self.min_level.set(level);
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level.get()
    }

    pub fn to_mcp_level(level: LogLevel) -> LoggingLevel {
        match level {
            LogLevel::Debug => LoggingLevel::Debug,
            LogLevel::Info => LoggingLevel::Info,
            LogLevel::Notice => LoggingLevel::Notice,
            LogLevel::Warning => LoggingLevel::Warning,
            LogLevel::Error => LoggingLevel::Error,
            LogLevel::Critical => LoggingLevel::Critical,
            LogLevel::Alert => LoggingLevel::Alert,
            LogLevel::Emergency => LoggingLevel::Emergency,
        }
    }

    pub fn from_mcp_level(level: LoggingLevel) -> LogLevel {
        match level {
            LoggingLevel::Debug => LogLevel::Debug,
            LoggingLevel::Info => LogLevel::Info,
            LoggingLevel::Notice => LogLevel::Notice,
            LoggingLevel::Warning => LogLevel::Warning,
            LoggingLevel::Error => LogLevel::Error,
            LoggingLevel::Critical => LogLevel::Critical,
            LoggingLevel::Alert => LogLevel::Alert,
            LoggingLevel::Emergency => LogLevel::Emergency,
        }
    }

    /// A closed transport means the session ended: forget the client so
    /// later records are dropped quietly instead of failing one by one.
    fn send_failed(&self, error: ServiceError) -> Result<(), SinkError> {
        match error {
            ServiceError::TransportClosed => {
                self.detach();
                Ok(())
            }
            other => Err(SinkError::Transport(other.to_string())),
        }
    }

    fn current_peer(&self) -> Option<Peer<RoleServer>> {
        self.peer.read().ok().and_then(|g| g.clone())
    }
}

#[async_trait]
impl LogSink for McpSink {
    fn name(&self) -> &'static str {
        "mcp"
    }

    fn state(&self) -> SinkState {
        self.state.get()
    }

    async fn log(&self, record: &LogRecord) -> Result<(), SinkError> {
        if record.level < self.min_level.get() {
            return Ok(());
        }
        // Records emitted before a client attaches are dropped.
        let Some(peer) = self.current_peer() else {
            return Ok(());
        };

        let param = LoggingMessageNotificationParam {
            level: Self::to_mcp_level(record.level),
            logger: Some(record.context.clone()),
            data: serde_json::Value::String(self.redactor.redact(&record.message)),
        };
        match peer.notify_logging_message(param).await {
            Ok(()) => Ok(()),
            Err(e) => self.send_failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogId;

    #[test]
    fn test_level_mapping_is_one_to_one() {
        for level in [
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Notice,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Critical,
            LogLevel::Alert,
            LogLevel::Emergency,
        ] {
            assert_eq!(McpSink::from_mcp_level(McpSink::to_mcp_level(level)), level);
        }
    }

    #[test]
    fn test_starts_uninitialized_at_info() {
        let sink = McpSink::new(Redactor::default());
        assert_eq!(sink.state(), SinkState::Uninitialized);
        assert_eq!(sink.min_level(), LogLevel::Info);
        assert!(!sink.is_attached());
    }

    #[tokio::test]
    async fn test_drops_records_without_client() {
        let sink = McpSink::new(Redactor::default());
        let record = LogRecord::new(LogLevel::Error, LogId::TOOL_FAILED, "tool", "boom");
        assert!(sink.log(&record).await.is_ok());
    }

    #[test]
    fn test_closed_transport_detaches_quietly() {
        let sink = McpSink::new(Redactor::default());
        sink.state.set(SinkState::Active);

        assert!(sink.send_failed(ServiceError::TransportClosed).is_ok());
        assert_eq!(sink.state(), SinkState::Uninitialized);
        assert!(!sink.is_attached());
    }

    #[test]
    fn test_other_send_errors_are_reported() {
        let sink = McpSink::new(Redactor::default());
        sink.state.set(SinkState::Active);

        let result = sink.send_failed(ServiceError::UnexpectedResponse);
        assert!(matches!(result, Err(SinkError::Transport(_))));
        assert_eq!(sink.state(), SinkState::Active);
    }

    #[test]
    fn test_set_min_level() {
        let sink = McpSink::new(Redactor::default());
        sink.set_min_level(LogLevel::Warning);
        assert_eq!(sink.min_level(), LogLevel::Warning);
    }
}
