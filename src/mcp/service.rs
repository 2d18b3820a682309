//! MCP service implementation using rmcp.
//!
//! `MongoService` exposes every MongoDB tool through the rmcp tool router.
//! Database tools are thin wrappers that build a [`DbOperation`] and hand it
//! to the shared [`ToolExecutor`].

use crate::atlas::{
    AccessListApi, AccessListOutcome, CreateAccessListInput, ensure_access_list_entries,
    entries_from_input,
};
use crate::config::parse_connection_string;
use crate::error::DbError;
use crate::logging::{LogId, McpSink};
use crate::tools::delete::{
    DeleteManyInput, DeleteManyOperation, DropCollectionInput, DropCollectionOperation,
    DropDatabaseInput, DropDatabaseOperation,
};
use crate::tools::explain::{ExplainInput, ExplainOperation};
use crate::tools::metadata::{
    CollectionIndexesOperation, CollectionInput, CollectionStorageSizeOperation,
    DbStatsOperation, ListCollectionsInput, ListCollectionsOperation, ListDatabasesOperation,
    MongodbLogsInput, MongodbLogsOperation,
};
use crate::tools::read::{
    AggregateInput, AggregateOperation, CollectionSchemaInput, CollectionSchemaOperation,
    CountInput, CountOperation, FindInput, FindOperation,
};
use crate::tools::write::{
    CreateCollectionInput, CreateCollectionOperation, CreateIndexInput, CreateIndexOperation,
    InsertManyInput, InsertManyOperation, RenameCollectionInput, RenameCollectionOperation,
    UpdateManyInput, UpdateManyOperation,
};
use crate::tools::{DbOperation, ToolExecutor, ToolFilter, ToolOutput};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{
        CallToolResult, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
        SetLevelRequestParam,
    },
    schemars::JsonSchema,
    service::{NotificationContext, RequestContext},
    tool, tool_handler, tool_router, RoleServer,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Input for the connect tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ConnectInput {
    /// MongoDB connection string (mongodb:// or mongodb+srv://)
    pub connection_string: String,
}

#[derive(Clone)]
pub struct MongoService {
    /// Shared execution pipeline (connection manager, logger, index check)
    executor: Arc<ToolExecutor>,
    /// Sink that forwards log records to the attached client
    mcp_sink: Option<Arc<McpSink>>,
    atlas: Option<Arc<dyn AccessListApi>>,
    /// Tool router for MCP tool dispatch (auto-generated, filtered)
    tool_router: ToolRouter<Self>,
}

impl MongoService {
    /// Create a service exposing every tool `filter` allows.
    pub fn new(executor: Arc<ToolExecutor>, filter: &ToolFilter) -> Self {
        let mut tool_router = Self::tool_router();
        for name in filter.removed_tools() {
            tool_router.remove_route(name);
        }
        Self {
            executor,
            mcp_sink: None,
            atlas: None,
            tool_router,
        }
    }

    pub fn with_mcp_sink(mut self, sink: Arc<McpSink>) -> Self {
        self.mcp_sink = Some(sink);
        self
    }

    pub fn with_atlas(mut self, api: Arc<dyn AccessListApi>) -> Self {
        self.atlas = Some(api);
        self
    }

    /// Names of the tools this instance advertises.
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tool_router.has_route(name)
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// Close the MongoDB connection and stop forwarding logs to the client.
    pub async fn shutdown(&self) {
        self.executor
            .logger()
            .info(LogId::SERVER_STOPPED, "server", "Server shutting down")
            .await;
        if let Some(sink) = &self.mcp_sink {
            sink.detach();
        }
        self.executor.connections().close().await;
        self.executor.logger().close().await;
    }

    async fn run(&self, operation: &dyn DbOperation) -> Result<CallToolResult, McpError> {
        Ok(self.executor.run(operation).await?.into())
    }
}

#[tool_router]
impl MongoService {
    #[tool(
        description = "Connect to a MongoDB instance.\nReplaces the current connection, if any. Use this when the server was started without a connection string."
    )]
    async fn connect(
        &self,
        Parameters(input): Parameters<ConnectInput>,
    ) -> Result<CallToolResult, McpError> {
        let connection_string =
            parse_connection_string(&input.connection_string).map_err(DbError::validation)?;
        self.executor
            .connections()
            .connect_to(&connection_string)
            .await?;
        Ok(ToolOutput::text("Successfully connected to MongoDB.").into())
    }

    #[tool(
        description = "Run a find query against a collection.\nFilter, projection and sort use MongoDB extended JSON. Returns at most `limit` documents (default 10)."
    )]
    async fn find(
        &self,
        Parameters(input): Parameters<FindInput>,
    ) -> Result<CallToolResult, McpError> {
        let operation = FindOperation::try_from(input)?;
        self.run(&operation).await
    }

    #[tool(description = "Run an aggregation pipeline against a collection.")]
    async fn aggregate(
        &self,
        Parameters(input): Parameters<AggregateInput>,
    ) -> Result<CallToolResult, McpError> {
        let operation = AggregateOperation::try_from(input)?;
        self.run(&operation).await
    }

    #[tool(description = "Count the documents in a collection, optionally matching a query.")]
    async fn count(
        &self,
        Parameters(input): Parameters<CountInput>,
    ) -> Result<CallToolResult, McpError> {
        let operation = CountOperation::try_from(input)?;
        self.run(&operation).await
    }

    #[tool(
        description = "Infer the schema of a collection from a random sample of documents.\nReports each field's BSON types and how often it occurs."
    )]
    async fn collection_schema(
        &self,
        Parameters(input): Parameters<CollectionSchemaInput>,
    ) -> Result<CallToolResult, McpError> {
        self.run(&CollectionSchemaOperation::from(input)).await
    }

    #[tool(description = "List all databases with their size on disk.")]
    async fn list_databases(&self) -> Result<CallToolResult, McpError> {
        self.run(&ListDatabasesOperation).await
    }

    #[tool(description = "List the collections of a database.")]
    async fn list_collections(
        &self,
        Parameters(input): Parameters<ListCollectionsInput>,
    ) -> Result<CallToolResult, McpError> {
        self.run(&ListCollectionsOperation::from(input)).await
    }

    #[tool(description = "Describe the indexes of a collection.")]
    async fn collection_indexes(
        &self,
        Parameters(input): Parameters<CollectionInput>,
    ) -> Result<CallToolResult, McpError> {
        self.run(&CollectionIndexesOperation::from(input)).await
    }

    #[tool(description = "Get the storage size of a collection.")]
    async fn collection_storage_size(
        &self,
        Parameters(input): Parameters<CollectionInput>,
    ) -> Result<CallToolResult, McpError> {
        self.run(&CollectionStorageSizeOperation::from(input)).await
    }

    #[tool(description = "Get statistics for a database (collections, objects, data and index sizes).")]
    async fn db_stats(
        &self,
        Parameters(input): Parameters<ListCollectionsInput>,
    ) -> Result<CallToolResult, McpError> {
        self.run(&DbStatsOperation::from(input)).await
    }

    #[tool(
        description = "Show the winning query plan for exactly one aggregate, find or count operation.\nUseful for checking index usage. The operation itself is not executed."
    )]
    async fn explain(
        &self,
        Parameters(input): Parameters<ExplainInput>,
    ) -> Result<CallToolResult, McpError> {
        let operation = ExplainOperation::try_from(input)?;
        self.run(&operation).await
    }

    #[tool(description = "Read the most recent MongoDB server log entries or startup warnings.")]
    async fn mongodb_logs(
        &self,
        Parameters(input): Parameters<MongodbLogsInput>,
    ) -> Result<CallToolResult, McpError> {
        self.run(&MongodbLogsOperation::from(input)).await
    }

    #[tool(description = "Insert documents into a collection.\nDocuments use MongoDB extended JSON; missing `_id` values are generated.")]
    async fn insert_many(
        &self,
        Parameters(input): Parameters<InsertManyInput>,
    ) -> Result<CallToolResult, McpError> {
        let operation = InsertManyOperation::try_from(input)?;
        self.run(&operation).await
    }

    #[tool(description = "Create an index on a collection.")]
    async fn create_index(
        &self,
        Parameters(input): Parameters<CreateIndexInput>,
    ) -> Result<CallToolResult, McpError> {
        let operation = CreateIndexOperation::try_from(input)?;
        self.run(&operation).await
    }

    #[tool(description = "Create a new collection. The database is created if it does not exist.")]
    async fn create_collection(
        &self,
        Parameters(input): Parameters<CreateCollectionInput>,
    ) -> Result<CallToolResult, McpError> {
        self.run(&CreateCollectionOperation::from(input)).await
    }

    #[tool(description = "Update every document matching a filter using update operators.")]
    async fn update_many(
        &self,
        Parameters(input): Parameters<UpdateManyInput>,
    ) -> Result<CallToolResult, McpError> {
        let operation = UpdateManyOperation::try_from(input)?;
        self.run(&operation).await
    }

    #[tool(description = "Rename a collection within its database.")]
    async fn rename_collection(
        &self,
        Parameters(input): Parameters<RenameCollectionInput>,
    ) -> Result<CallToolResult, McpError> {
        self.run(&RenameCollectionOperation::from(input)).await
    }

    #[tool(description = "Delete every document matching a filter. An empty filter deletes all documents.")]
    async fn delete_many(
        &self,
        Parameters(input): Parameters<DeleteManyInput>,
    ) -> Result<CallToolResult, McpError> {
        let operation = DeleteManyOperation::try_from(input)?;
        self.run(&operation).await
    }

    #[tool(description = "Drop a collection and all of its indexes.")]
    async fn drop_collection(
        &self,
        Parameters(input): Parameters<DropCollectionInput>,
    ) -> Result<CallToolResult, McpError> {
        self.run(&DropCollectionOperation::from(input)).await
    }

    #[tool(description = "Drop a database and all of its collections.")]
    async fn drop_database(
        &self,
        Parameters(input): Parameters<DropDatabaseInput>,
    ) -> Result<CallToolResult, McpError> {
        self.run(&DropDatabaseOperation::from(input)).await
    }

    #[tool(
        description = "Allow IP addresses or CIDR ranges to reach an Atlas project.\nEntries that already exist are left unchanged."
    )]
    async fn atlas_create_access_list(
        &self,
        Parameters(input): Parameters<CreateAccessListInput>,
    ) -> Result<CallToolResult, McpError> {
        let api = self.atlas.as_deref().ok_or_else(|| {
            DbError::configuration("Atlas API credentials are not configured")
        })?;
        let entries = entries_from_input(api, &input).await?;
        let outcome = ensure_access_list_entries(api, &input.project_id, &entries).await?;

        let message = match outcome {
            AccessListOutcome::Created => format!(
                "Added {} entries to the access list of project {}.",
                entries.len(),
                input.project_id
            ),
            AccessListOutcome::AlreadyPresent => format!(
                "The access list of project {} already contains these entries.",
                input.project_id
            ),
        };
        self.executor
            .logger()
            .info(LogId::ACCESS_LIST_UPDATED, "atlas", message.clone())
            .await;
        Ok(ToolOutput::text(message).into())
    }
}

#[tool_handler]
impl ServerHandler for MongoService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_logging()
                .build(),
            server_info: Implementation {
                name: "mongo-mcp-server".to_owned(),
                title: Some("MongoDB MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for querying and managing a MongoDB deployment.\n\
                \n\
                ## Workflow\n\
                1. If the server was started without a connection string, call `connect` first\n\
                2. Use `list_databases` and `list_collections` to discover data\n\
                3. Use `collection_schema` and `collection_indexes` before writing queries\n\
                \n\
                ## Arguments\n\
                Filters, projections, pipelines and documents use MongoDB extended JSON,\n\
                e.g. {\"_id\": {\"$oid\": \"...\"}} or {\"createdAt\": {\"$date\": \"2024-01-01T00:00:00Z\"}}.\n\
                Results are returned as canonical extended JSON.\n\
                \n\
                ## Performance\n\
                Use `explain` to check whether a query uses an index."
                    .to_string(),
            ),
        }
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        if let Some(sink) = &self.mcp_sink {
            sink.attach(context.peer.clone());
            debug!("MCP log sink attached");
        }
        info!("Client initialized");
        self.executor
            .logger()
            .info(LogId::CLIENT_ATTACHED, "server", "MCP client initialized")
            .await;
    }

    async fn set_level(
        &self,
        request: SetLevelRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<(), McpError> {
        let level = McpSink::from_mcp_level(request.level);
        if let Some(sink) = &self.mcp_sink {
            sink.set_min_level(level);
        }
        debug!(level = %level, "Client log level changed");
        Ok(())
    }
}

/// A service with no connection target, for unit tests.
#[cfg(test)]
pub(crate) fn create_test_service(filter: &ToolFilter) -> MongoService {
    use crate::db::{ConnectionManager, MongoConnector};
    use crate::logging::{CompositeLogger, ConsoleSink, Redactor};
    use crate::tools::ExecutorSettings;
    use std::time::Duration;

    let logger = Arc::new(
        CompositeLogger::new(vec![Arc::new(ConsoleSink::new(Redactor::default()))]).unwrap(),
    );
    let connector = Arc::new(MongoConnector::new("test", Duration::from_secs(1)));
    let manager = Arc::new(ConnectionManager::new(connector, None, logger.clone()));
    let executor = Arc::new(ToolExecutor::new(
        manager,
        logger,
        ExecutorSettings::default(),
    ));
    MongoService::new(executor, filter)
}
