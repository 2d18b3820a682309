//! Console sink: one `tracing` event per record, written to stderr by the
//! subscriber installed in `main`.

use crate::logging::{LogLevel, LogRecord, LogSink, Redactor, SinkError};
use async_trait::async_trait;
use tracing::Level;

pub struct ConsoleSink {
    redactor: Redactor,
}

impl ConsoleSink {
    pub fn new(redactor: Redactor) -> Self {
        Self { redactor }
    }

    /// `tracing` has no notice/critical/alert/emergency levels.
    pub fn tracing_level(level: LogLevel) -> Level {
        match level {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info | LogLevel::Notice => Level::INFO,
            LogLevel::Warning => Level::WARN,
            LogLevel::Error | LogLevel::Critical | LogLevel::Alert | LogLevel::Emergency => {
                Level::ERROR
            }
        }
    }
}

#[async_trait]
impl LogSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "stderr"
    }

    async fn log(&self, record: &LogRecord) -> Result<(), SinkError> {
        let message = self.redactor.redact(&record.message);
        let id = record.id.0;
        let context = record.context.as_str();
        let severity = record.level.as_str();

        let level = Self::tracing_level(record.level);
        if level == Level::DEBUG {
            tracing::debug!(id, context, severity, "{message}");
        } else if level == Level::INFO {
            tracing::info!(id, context, severity, "{message}");
        } else if level == Level::WARN {
            tracing::warn!(id, context, severity, "{message}");
        } else {
            tracing::error!(id, context, severity, "{message}");
        }
        Ok(())
    }
}
