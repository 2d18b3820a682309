//! Tool Execution Pipeline.
//!
//! Every database tool is a [`DbOperation`] run through [`ToolExecutor`]:
//! validate → ensure connection → optional index check → execute → format.

use crate::db::{ConnectionManager, Driver, DriverResult, Namespace};
use crate::error::{DbError, DbResult};
use crate::logging::{CompositeLogger, LogId};
use crate::tools::index_check::{IndexUsageInspector, explain_command};
use async_trait::async_trait;
use mongodb::bson::Document;
use rmcp::model::{CallToolResult, Content};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Tool category, used for read-only mode and `--disabled-tools`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationCategory {
    Read,
    Write,
    Delete,
    Metadata,
    Create,
    Drop,
}

impl OperationCategory {
    pub const ALL: [OperationCategory; 6] = [
        Self::Read,
        Self::Write,
        Self::Delete,
        Self::Metadata,
        Self::Create,
        Self::Drop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Metadata => "metadata",
            Self::Create => "create",
            Self::Drop => "drop",
        }
    }

    /// Categories that change data or schema.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Write | Self::Delete | Self::Create | Self::Drop)
    }
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every database operation exposed as a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Find,
    Aggregate,
    Count,
    CollectionSchema,
    ListDatabases,
    ListCollections,
    CollectionIndexes,
    CollectionStorageSize,
    DbStats,
    Explain,
    MongodbLogs,
    InsertMany,
    CreateIndex,
    CreateCollection,
    UpdateMany,
    RenameCollection,
    DeleteMany,
    DropCollection,
    DropDatabase,
}

/// Operations that get a pre-execution index check when it is enabled.
pub const INDEX_CHECKED_OPERATIONS: &[OperationKind] = &[
    OperationKind::Find,
    OperationKind::Aggregate,
    OperationKind::Count,
    OperationKind::DeleteMany,
    OperationKind::UpdateMany,
];

impl OperationKind {
    pub const ALL: [OperationKind; 19] = [
        Self::Find,
        Self::Aggregate,
        Self::Count,
        Self::CollectionSchema,
        Self::ListDatabases,
        Self::ListCollections,
        Self::CollectionIndexes,
        Self::CollectionStorageSize,
        Self::DbStats,
        Self::Explain,
        Self::MongodbLogs,
        Self::InsertMany,
        Self::CreateIndex,
        Self::CreateCollection,
        Self::UpdateMany,
        Self::RenameCollection,
        Self::DeleteMany,
        Self::DropCollection,
        Self::DropDatabase,
    ];

    /// Tool name, also used to tag operation errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Aggregate => "aggregate",
            Self::Count => "count",
            Self::CollectionSchema => "collection_schema",
            Self::ListDatabases => "list_databases",
            Self::ListCollections => "list_collections",
            Self::CollectionIndexes => "collection_indexes",
            Self::CollectionStorageSize => "collection_storage_size",
            Self::DbStats => "db_stats",
            Self::Explain => "explain",
            Self::MongodbLogs => "mongodb_logs",
            Self::InsertMany => "insert_many",
            Self::CreateIndex => "create_index",
            Self::CreateCollection => "create_collection",
            Self::UpdateMany => "update_many",
            Self::RenameCollection => "rename_collection",
            Self::DeleteMany => "delete_many",
            Self::DropCollection => "drop_collection",
            Self::DropDatabase => "drop_database",
        }
    }

    pub fn category(&self) -> OperationCategory {
        match self {
            Self::Find | Self::Aggregate | Self::Count | Self::CollectionSchema => {
                OperationCategory::Read
            }
            Self::ListDatabases
            | Self::ListCollections
            | Self::CollectionIndexes
            | Self::CollectionStorageSize
            | Self::DbStats
            | Self::Explain
            | Self::MongodbLogs => OperationCategory::Metadata,
            Self::InsertMany | Self::CreateIndex | Self::CreateCollection => {
                OperationCategory::Create
            }
            Self::UpdateMany | Self::RenameCollection => OperationCategory::Write,
            Self::DeleteMany => OperationCategory::Delete,
            Self::DropCollection | Self::DropDatabase => OperationCategory::Drop,
        }
    }

    pub fn is_index_checked(&self) -> bool {
        INDEX_CHECKED_OPERATIONS.contains(self)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered text blocks returned to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub blocks: Vec<String>,
}

impl ToolOutput {
    pub fn text(summary: impl Into<String>) -> Self {
        Self {
            blocks: vec![summary.into()],
        }
    }

    pub fn push(&mut self, block: impl Into<String>) {
        self.blocks.push(block.into());
    }

    pub fn with_blocks(mut self, blocks: impl IntoIterator<Item = String>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    pub fn summary(&self) -> Option<&str> {
        self.blocks.first().map(String::as_str)
    }
}

impl From<ToolOutput> for CallToolResult {
    fn from(output: ToolOutput) -> Self {
        CallToolResult::success(output.blocks.into_iter().map(Content::text).collect())
    }
}

/// A single database operation with already-typed arguments.
#[async_trait]
pub trait DbOperation: Send + Sync {
    fn kind(&self) -> OperationKind;

    fn namespace(&self) -> Namespace;

    /// Checks that need no I/O. Runs before the connection is touched.
    fn validate(&self) -> DbResult<()> {
        Ok(())
    }

    /// Whether this call changes data. Defaults to the category's answer.
    fn is_mutating(&self) -> bool {
        self.kind().category().is_mutating()
    }

    /// The command whose plan the index check should inspect.
    ///
    /// Must be a read-only shape: `find`, `aggregate`, `count`, or the
    /// `delete`/`update` command that will be wrapped in `explain`.
    fn explain_body(&self) -> Option<Document> {
        None
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput>;
}

/// Non-empty check shared by the tools' `validate` implementations.
pub fn require_name(field: &str, value: &str) -> DbResult<()> {
    if value.trim().is_empty() {
        return Err(DbError::validation(format!("`{field}` must not be empty")));
    }
    Ok(())
}

/// Settings captured once at start-up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorSettings {
    pub index_check: bool,
    pub read_only: bool,
}

pub struct ToolExecutor {
    connections: Arc<ConnectionManager>,
    logger: Arc<CompositeLogger>,
    inspector: IndexUsageInspector,
    settings: ExecutorSettings,
}

impl ToolExecutor {
    pub fn new(
        connections: Arc<ConnectionManager>,
        logger: Arc<CompositeLogger>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            connections,
            inspector: IndexUsageInspector::new(logger.clone()),
            logger,
            settings,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn logger(&self) -> &Arc<CompositeLogger> {
        &self.logger
    }

    pub fn settings(&self) -> ExecutorSettings {
        self.settings
    }

    pub async fn run(&self, operation: &dyn DbOperation) -> DbResult<ToolOutput> {
        let kind = operation.kind();
        let namespace = operation.namespace();
        let index_check = self.settings.index_check;

        let result = self.run_steps(operation, kind, &namespace, index_check).await;

        match &result {
            Ok(_) => {
                self.logger
                    .debug(
                        LogId::TOOL_EXECUTED,
                        "tool",
                        format!("Tool {kind} succeeded on {namespace}"),
                    )
                    .await;
            }
            Err(e) => {
                self.logger
                    .error(LogId::TOOL_FAILED, "tool", format!("Tool {kind} failed: {e}"))
                    .await;
            }
        }
        result
    }

    async fn run_steps(
        &self,
        operation: &dyn DbOperation,
        kind: OperationKind,
        namespace: &Namespace,
        index_check: bool,
    ) -> DbResult<ToolOutput> {
        operation.validate()?;

        if self.settings.read_only && operation.is_mutating() {
            return Err(DbError::permission(
                kind.name(),
                "the server runs in read-only mode and this call would modify data",
            ));
        }

        let driver = self.connections.ensure_connected().await?;

        if index_check && kind.is_index_checked() {
            if let Some(body) = operation.explain_body() {
                let command = explain_command(body, "queryPlanner");
                debug!(tool = %kind, namespace = %namespace, "Running index check");
                self.inspector
                    .check_index_usage(namespace, kind, || {
                        driver.run_command(&namespace.database, command)
                    })
                    .await;
            }
        }

        operation
            .execute(driver.as_ref())
            .await
            .map_err(|e| DbError::from_driver(kind.name(), namespace.to_string(), e))
    }
}

impl fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
