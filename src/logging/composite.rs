//! Composite logger.
//!
//! Fans every record out to all configured sinks. A sink that fails is
//! reported through `tracing` and never prevents delivery to the others.

use crate::error::{DbError, DbResult};
use crate::logging::{LogId, LogLevel, LogRecord, LogSink, SinkState};
use futures_util::future::join_all;
use std::sync::{Arc, RwLock};

type SinkList = Arc<Vec<Arc<dyn LogSink>>>;

pub struct CompositeLogger {
    sinks: RwLock<SinkList>,
}

impl CompositeLogger {
    /// Create a logger over the given sinks. At least one sink is required.
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> DbResult<Self> {
        Self::check_not_empty(&sinks)?;
        Ok(Self {
            sinks: RwLock::new(Arc::new(sinks)),
        })
    }

    /// Replace the active sink set. An empty set is rejected and the
    /// previous set stays in place.
    pub fn set_loggers(&self, sinks: Vec<Arc<dyn LogSink>>) -> DbResult<()> {
        Self::check_not_empty(&sinks)?;
        let mut guard = self
            .sinks
            .write()
            .map_err(|_| DbError::internal("logger sink list lock poisoned"))?;
        *guard = Arc::new(sinks);
        Ok(())
    }

    /// Names of the currently active sinks, in dispatch order.
    pub fn sink_names(&self) -> Vec<&'static str> {
        self.snapshot().iter().map(|s| s.name()).collect()
    }

    fn check_not_empty(sinks: &[Arc<dyn LogSink>]) -> DbResult<()> {
        if sinks.is_empty() {
            return Err(DbError::configuration(
                "At least one logger is required (disk, stderr or mcp)",
            ));
        }
        Ok(())
    }

    fn snapshot(&self) -> SinkList {
        match self.sinks.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Deliver a record to every sink that has not failed.
    pub async fn log(&self, level: LogLevel, id: LogId, context: &str, message: impl Into<String>) {
        let record = LogRecord::new(level, id, context, message);
        let sinks = self.snapshot();

        let deliveries = sinks
            .iter()
            .filter(|sink| sink.state() != SinkState::Failed)
            .map(|sink| {
                let record = &record;
                async move {
                    if let Err(e) = sink.log(record).await {
                        tracing::warn!(sink = sink.name(), error = %e, "Failed to deliver log record");
                    }
                }
            });
        join_all(deliveries).await;
    }

    /// Flush every sink. Used on shutdown.
    pub async fn close(&self) {
        let sinks = self.snapshot();
        join_all(sinks.iter().map(|sink| sink.close())).await;
    }

    pub async fn debug(&self, id: LogId, context: &str, message: impl Into<String>) {
        self.log(LogLevel::Debug, id, context, message).await;
    }

    pub async fn info(&self, id: LogId, context: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, id, context, message).await;
    }

    pub async fn notice(&self, id: LogId, context: &str, message: impl Into<String>) {
        self.log(LogLevel::Notice, id, context, message).await;
    }

    pub async fn warning(&self, id: LogId, context: &str, message: impl Into<String>) {
        self.log(LogLevel::Warning, id, context, message).await;
    }

    pub async fn error(&self, id: LogId, context: &str, message: impl Into<String>) {
        self.log(LogLevel::Error, id, context, message).await;
    }
}

impl std::fmt::Debug for CompositeLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeLogger")
            .field("sinks", &self.sink_names())
            .finish()
    }
}
