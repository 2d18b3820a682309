//! Narrow driver interface consumed by the tool pipeline.
//!
//! Every tool is expressed as a database command document, so the only thing
//! the rest of the server needs from a driver is "run this command against
//! this database". This keeps the pipeline testable with a scripted driver.

use crate::db::reply::drain_cursor;
use async_trait::async_trait;
use mongodb::bson::Document;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Database + collection pair targeted by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Namespace for database-level operations (no collection).
    pub fn database(database: impl Into<String>) -> Self {
        Self::new(database, "")
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.collection.is_empty() {
            write!(f, "{}", self.database)
        } else {
            write!(f, "{}.{}", self.database, self.collection)
        }
    }
}

/// Broad classification of driver failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The server rejected the command (ok: 0).
    Command,
    /// Network, server selection or authentication failure.
    Connectivity,
    /// Anything else reported by the driver.
    Other,
}

/// Error reported by the driver, kept verbatim.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub code: Option<i32>,
    pub code_name: Option<String>,
    pub message: String,
}

impl DriverError {
    pub fn command(code: i32, code_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Command,
            code: Some(code),
            code_name: Some(code_name.into()),
            message: message.into(),
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Connectivity,
            code: None,
            code_name: None,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Other,
            code: None,
            code_name: None,
            message: message.into(),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        self.kind == DriverErrorKind::Connectivity
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// A live connection to a deployment.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Run a database command and return the server's reply.
    ///
    /// Replies with `ok: 0` must be reported as `DriverErrorKind::Command`.
    async fn run_command(&self, database: &str, command: Document) -> DriverResult<Document>;

    /// Run a cursor-returning command and collect every document.
    ///
    /// `getMore` must reach the server through the session and the mongos
    /// that opened the cursor. The default follows the cursor through
    /// `run_command`, which is only sound for single-connection doubles;
    /// real drivers override it.
    async fn run_cursor_command(
        &self,
        database: &str,
        command: Document,
    ) -> DriverResult<Vec<Document>> {
        let reply = self.run_command(database, command).await?;
        drain_cursor(self, database, reply).await
    }

    /// Release the underlying resources. Further commands may fail.
    async fn close(&self);
}

/// Opens drivers from a connection string.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, connection_string: &str) -> DriverResult<Arc<dyn Driver>>;
}
