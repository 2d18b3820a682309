//! Metadata tools: databases, collections, indexes, storage statistics and
//! server logs.

use crate::db::{Driver, DriverResult, Namespace, get_number};
use crate::error::{DbError, DbResult};
use crate::tools::format::to_extjson;
use crate::tools::pipeline::{DbOperation, OperationKind, ToolOutput, require_name};
use async_trait::async_trait;
use humansize::{DECIMAL, format_size};
use mongodb::bson::{Bson, doc};
use schemars::JsonSchema;
use serde::Deserialize;

pub const DEFAULT_LOG_LIMIT: u32 = 50;
pub const MAX_LOG_LIMIT: u32 = 1024;

fn default_log_limit() -> u32 {
    DEFAULT_LOG_LIMIT
}

// list_databases

#[derive(Debug, Clone, Default)]
pub struct ListDatabasesOperation;

#[async_trait]
impl DbOperation for ListDatabasesOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::ListDatabases
    }

    fn namespace(&self) -> Namespace {
        Namespace::database("admin")
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let reply = driver.run_command("admin", doc! { "listDatabases": 1 }).await?;
        let databases = reply.get_array("databases").map(Vec::as_slice).unwrap_or_default();

        let blocks: Vec<String> = databases
            .iter()
            .filter_map(Bson::as_document)
            .map(|db| {
                format!(
                    "Name: {}, Size: {} bytes",
                    db.get_str("name").unwrap_or_default(),
                    get_number(db, "sizeOnDisk").unwrap_or_default()
                )
            })
            .collect();

        let mut output = ToolOutput::text(format!("Found {} databases:", blocks.len()));
        output.blocks.extend(blocks);
        Ok(output)
    }
}

// list_collections

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListCollectionsInput {
    /// Database name
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct ListCollectionsOperation {
    namespace: Namespace,
}

impl From<ListCollectionsInput> for ListCollectionsOperation {
    fn from(input: ListCollectionsInput) -> Self {
        Self {
            namespace: Namespace::database(input.database),
        }
    }
}

#[async_trait]
impl DbOperation for ListCollectionsOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::ListCollections
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_name("database", &self.namespace.database)
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let database = &self.namespace.database;
        let command = doc! {
            "listCollections": 1,
            "nameOnly": true,
            "authorizedCollections": true,
            "cursor": {},
        };
        let collections = driver.run_cursor_command(database, command).await?;

        if collections.is_empty() {
            return Ok(ToolOutput::text(format!(
                "No collections found for database \"{database}\". \
                 To create a collection, use the \"create_collection\" tool."
            )));
        }

        let mut output = ToolOutput::text(format!(
            "Found {} collections in database \"{database}\":",
            collections.len()
        ));
        for collection in &collections {
            output.push(format!("Name: \"{}\"", collection.get_str("name").unwrap_or_default()));
        }
        Ok(output)
    }
}

// collection_indexes / collection_storage_size

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CollectionInput {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct CollectionIndexesOperation {
    namespace: Namespace,
}

impl From<CollectionInput> for CollectionIndexesOperation {
    fn from(input: CollectionInput) -> Self {
        Self {
            namespace: Namespace::new(input.database, input.collection),
        }
    }
}

#[async_trait]
impl DbOperation for CollectionIndexesOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::CollectionIndexes
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_name("database", &self.namespace.database)?;
        require_name("collection", &self.namespace.collection)
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let database = &self.namespace.database;
        let command = doc! { "listIndexes": self.namespace.collection.as_str(), "cursor": {} };
        let indexes = driver.run_cursor_command(database, command).await?;

        let mut output = ToolOutput::text(format!(
            "Found {} indexes in the collection \"{}\":",
            indexes.len(),
            self.namespace.collection
        ));
        for index in indexes {
            let name = index.get_str("name").unwrap_or_default().to_string();
            let key = index.get_document("key").cloned().unwrap_or_default();
            output.push(format!("Name \"{name}\", definition: {}", to_extjson(key)));
        }
        Ok(output)
    }
}

#[derive(Debug, Clone)]
pub struct CollectionStorageSizeOperation {
    namespace: Namespace,
}

impl From<CollectionInput> for CollectionStorageSizeOperation {
    fn from(input: CollectionInput) -> Self {
        Self {
            namespace: Namespace::new(input.database, input.collection),
        }
    }
}

#[async_trait]
impl DbOperation for CollectionStorageSizeOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::CollectionStorageSize
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_name("database", &self.namespace.database)?;
        require_name("collection", &self.namespace.collection)
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let database = &self.namespace.database;
        let command = doc! {
            "aggregate": self.namespace.collection.as_str(),
            "pipeline": [
                { "$collStats": { "storageStats": {} } },
                { "$group": { "_id": Bson::Null, "value": { "$sum": "$storageStats.size" } } },
            ],
            "cursor": {},
        };
        let results = driver.run_cursor_command(database, command).await?;
        let bytes = results
            .first()
            .and_then(|r| get_number(r, "value"))
            .unwrap_or_default()
            .max(0) as u64;

        Ok(ToolOutput::text(format!(
            "The size of \"{}\" is `{}`",
            self.namespace,
            format_size(bytes, DECIMAL)
        )))
    }
}

// db_stats

#[derive(Debug, Clone)]
pub struct DbStatsOperation {
    namespace: Namespace,
}

impl From<ListCollectionsInput> for DbStatsOperation {
    fn from(input: ListCollectionsInput) -> Self {
        Self {
            namespace: Namespace::database(input.database),
        }
    }
}

#[async_trait]
impl DbOperation for DbStatsOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::DbStats
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_name("database", &self.namespace.database)
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let mut reply = driver
            .run_command(&self.namespace.database, doc! { "dbStats": 1, "scale": 1 })
            .await?;
        reply.remove("ok");
        Ok(ToolOutput::text(format!(
            "Statistics for database \"{}\":",
            self.namespace.database
        ))
        .with_blocks([to_extjson(reply)]))
    }
}

// mongodb_logs

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ServerLogType {
    /// Recent server log entries
    #[default]
    Global,
    /// Warnings emitted when the server started
    StartupWarnings,
}

impl ServerLogType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::StartupWarnings => "startupWarnings",
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MongodbLogsInput {
    /// Which log to read. Default: global
    #[serde(default, rename = "type")]
    pub log_type: ServerLogType,
    /// Maximum number of entries to return. Default: 50, max: 1024
    #[serde(default = "default_log_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct MongodbLogsOperation {
    log_type: ServerLogType,
    limit: u32,
}

impl From<MongodbLogsInput> for MongodbLogsOperation {
    fn from(input: MongodbLogsInput) -> Self {
        Self {
            log_type: input.log_type,
            limit: input.limit,
        }
    }
}

#[async_trait]
impl DbOperation for MongodbLogsOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::MongodbLogs
    }

    fn namespace(&self) -> Namespace {
        Namespace::database("admin")
    }

    fn validate(&self) -> DbResult<()> {
        if self.limit == 0 || self.limit > MAX_LOG_LIMIT {
            return Err(DbError::validation(format!(
                "`limit` must be between 1 and {MAX_LOG_LIMIT}"
            )));
        }
        Ok(())
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let reply = driver
            .run_command("admin", doc! { "getLog": self.log_type.as_str() })
            .await?;
        let total = get_number(&reply, "totalLinesWritten").unwrap_or_default();
        let lines = reply.get_array("log").map(Vec::as_slice).unwrap_or_default();

        let mut output = ToolOutput::text(format!("Found: {total} messages"));
        for line in lines.iter().take(self.limit as usize) {
            match line {
                Bson::String(text) => output.push(text.clone()),
                other => output.push(other.to_string()),
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_input_defaults() {
        let input: MongodbLogsInput = serde_json::from_value(json!({})).unwrap();
        assert_eq!(input.log_type, ServerLogType::Global);
        assert_eq!(input.limit, DEFAULT_LOG_LIMIT);

        let input: MongodbLogsInput =
            serde_json::from_value(json!({ "type": "startupWarnings", "limit": 5 })).unwrap();
        assert_eq!(input.log_type.as_str(), "startupWarnings");
    }

    #[test]
    fn test_log_limit_bounds() {
        let op = MongodbLogsOperation {
            log_type: ServerLogType::Global,
            limit: MAX_LOG_LIMIT + 1,
        };
        assert!(matches!(op.validate(), Err(DbError::Validation { .. })));
    }

    #[test]
    fn test_metadata_operations_are_not_index_checked() {
        assert!(!ListDatabasesOperation.kind().is_index_checked());
        let op = CollectionIndexesOperation::from(CollectionInput {
            database: "shop".into(),
            collection: "orders".into(),
        });
        assert!(op.explain_body().is_none());
    }
}
