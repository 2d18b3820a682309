//! Shared fixtures for integration tests: a scripted driver, a connector
//! that hands it out, and an in-memory log sink.

#![allow(dead_code)]

use async_trait::async_trait;
use mongo_mcp_server::db::{Connector, ConnectionManager, Driver, DriverError, DriverResult};
use mongo_mcp_server::logging::{
    CompositeLogger, LogLevel, LogRecord, LogSink, SinkError,
};
use mongo_mcp_server::tools::{ExecutorSettings, ToolExecutor};
use mongodb::bson::{Document, doc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replies to commands by name (the first key of the command document) and
/// records everything it was asked to run.
#[derive(Default)]
pub struct ScriptedDriver {
    replies: Mutex<HashMap<String, DriverResult<Document>>>,
    commands: Mutex<Vec<(String, Document)>>,
}

impl ScriptedDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, command: &str, reply: Document) {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), Ok(reply));
    }

    pub fn fail(&self, command: &str, err: DriverError) {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), Err(err));
    }

    /// Names of the commands run so far, in order.
    pub fn command_names(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| command_name(c))
            .collect()
    }

    pub fn commands(&self) -> Vec<(String, Document)> {
        self.commands.lock().unwrap().clone()
    }
}

fn command_name(command: &Document) -> String {
    command.keys().next().cloned().unwrap_or_default()
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn run_command(&self, database: &str, command: Document) -> DriverResult<Document> {
        let name = command_name(&command);
        self.commands
            .lock()
            .unwrap()
            .push((database.to_string(), command));
        self.replies
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| Ok(doc! { "ok": 1 }))
    }

    async fn close(&self) {}
}

/// Hands out the same scripted driver on every connect and counts dials.
pub struct ScriptedConnector {
    pub driver: Arc<ScriptedDriver>,
    pub dials: AtomicUsize,
    pub fail_with: Option<String>,
}

impl ScriptedConnector {
    pub fn new(driver: Arc<ScriptedDriver>) -> Arc<Self> {
        Arc::new(Self {
            driver,
            dials: AtomicUsize::new(0),
            fail_with: None,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            driver: ScriptedDriver::new(),
            dials: AtomicUsize::new(0),
            fail_with: Some(message.to_string()),
        })
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _connection_string: &str) -> DriverResult<Arc<dyn Driver>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        match &self.fail_with {
            Some(message) => Err(DriverError::connectivity(message.clone())),
            None => Ok(self.driver.clone()),
        }
    }
}

/// Keeps every record in memory.
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn at_level(&self, level: LogLevel) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.level == level)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn log(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Always fails to deliver.
pub struct BrokenSink;

#[async_trait]
impl LogSink for BrokenSink {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn log(&self, _record: &LogRecord) -> Result<(), SinkError> {
        Err(SinkError::Transport("client went away".to_string()))
    }
}

pub const TEST_URI: &str = "mongodb://localhost:27017";

/// Executor wired to a scripted driver, recording application logs.
pub struct Harness {
    pub driver: Arc<ScriptedDriver>,
    pub connector: Arc<ScriptedConnector>,
    pub sink: Arc<MemorySink>,
    pub executor: ToolExecutor,
}

impl Harness {
    pub fn new(settings: ExecutorSettings) -> Self {
        let driver = ScriptedDriver::new();
        let connector = ScriptedConnector::new(driver.clone());
        let sink = MemorySink::new();
        let logger = Arc::new(CompositeLogger::new(vec![sink.clone()]).unwrap());
        let connections = Arc::new(ConnectionManager::new(
            connector.clone(),
            Some(TEST_URI.to_string()),
            logger.clone(),
        ));
        let executor = ToolExecutor::new(connections, logger, settings);
        Self {
            driver,
            connector,
            sink,
            executor,
        }
    }
}

/// Single-batch cursor reply.
pub fn cursor_reply(ns: &str, documents: Vec<Document>) -> Document {
    doc! {
        "cursor": { "id": 0_i64, "ns": ns, "firstBatch": documents },
        "ok": 1,
    }
}

pub fn collscan_plan() -> Document {
    doc! {
        "queryPlanner": {
            "winningPlan": { "stage": "COLLSCAN", "direction": "forward" },
            "rejectedPlans": [],
        },
        "ok": 1,
    }
}

pub fn ixscan_plan() -> Document {
    doc! {
        "queryPlanner": {
            "winningPlan": {
                "stage": "FETCH",
                "inputStage": { "stage": "IXSCAN", "indexName": "status_1" },
            },
            "rejectedPlans": [ { "stage": "COLLSCAN" } ],
        },
        "ok": 1,
    }
}
