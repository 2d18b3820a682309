//! Read tools: `find`, `aggregate`, `count`, `collection_schema`.

use crate::db::{Driver, DriverResult, Namespace, get_number};
use crate::error::{DbError, DbResult};
use crate::tools::format::{
    JsonObject, document_blocks, to_document, to_documents, to_optional_document,
};
use crate::tools::pipeline::{DbOperation, OperationKind, ToolOutput, require_name};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc};
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_FIND_LIMIT: i64 = 10;
pub const DEFAULT_SAMPLE_SIZE: u32 = 50;

fn default_find_limit() -> i64 {
    DEFAULT_FIND_LIMIT
}

fn default_sample_size() -> u32 {
    DEFAULT_SAMPLE_SIZE
}

fn require_namespace(namespace: &Namespace) -> DbResult<()> {
    require_name("database", &namespace.database)?;
    require_name("collection", &namespace.collection)
}

// find

/// Arguments of a find, shared with the explain tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindArgs {
    /// Query filter, in MongoDB extended JSON. Omit to match every document.
    #[serde(default)]
    pub filter: Option<JsonObject>,
    /// Fields to include or exclude in the returned documents
    #[serde(default)]
    pub projection: Option<JsonObject>,
    /// Sort specification, e.g. {"createdAt": -1}
    #[serde(default)]
    pub sort: Option<JsonObject>,
    /// Maximum number of documents to return. Default: 10
    #[serde(default = "default_find_limit")]
    pub limit: i64,
}

impl Default for FindArgs {
    fn default() -> Self {
        Self {
            filter: None,
            projection: None,
            sort: None,
            limit: DEFAULT_FIND_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindInput {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
    #[serde(flatten)]
    pub args: FindArgs,
}

#[derive(Debug, Clone)]
pub struct FindOperation {
    namespace: Namespace,
    filter: Document,
    projection: Option<Document>,
    sort: Option<Document>,
    limit: i64,
}

impl FindOperation {
    pub fn new(namespace: Namespace, args: FindArgs) -> DbResult<Self> {
        Ok(Self {
            namespace,
            filter: to_optional_document("filter", args.filter)?,
            projection: args
                .projection
                .map(|p| to_document("projection", p))
                .transpose()?,
            sort: args
                .sort
                .map(|s| to_document("sort", s))
                .transpose()?,
            limit: args.limit,
        })
    }

    pub fn command(&self) -> Document {
        let mut command = doc! {
            "find": self.namespace.collection.as_str(),
            "filter": self.filter.clone(),
        };
        if let Some(projection) = &self.projection {
            command.insert("projection", projection.clone());
        }
        if let Some(sort) = &self.sort {
            command.insert("sort", sort.clone());
        }
        command.insert("limit", self.limit);
        command
    }
}

impl TryFrom<FindInput> for FindOperation {
    type Error = DbError;

    fn try_from(input: FindInput) -> DbResult<Self> {
        Self::new(Namespace::new(input.database, input.collection), input.args)
    }
}

#[async_trait]
impl DbOperation for FindOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Find
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_namespace(&self.namespace)?;
        if self.limit < 0 {
            return Err(DbError::validation("`limit` must not be negative"));
        }
        Ok(())
    }

    fn explain_body(&self) -> Option<Document> {
        Some(self.command())
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let database = &self.namespace.database;
        let documents = driver.run_cursor_command(database, self.command()).await?;

        Ok(ToolOutput::text(format!(
            "Found {} documents in the collection \"{}\":",
            documents.len(),
            self.namespace.collection
        ))
        .with_blocks(document_blocks(documents)))
    }
}

// aggregate

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct AggregateArgs {
    /// Aggregation pipeline stages, in MongoDB extended JSON
    pub pipeline: Vec<JsonObject>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AggregateInput {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
    #[serde(flatten)]
    pub args: AggregateArgs,
}

#[derive(Debug, Clone)]
pub struct AggregateOperation {
    namespace: Namespace,
    pipeline: Vec<Document>,
}

/// Stages that write their results into a collection.
const WRITING_STAGES: &[&str] = &["$out", "$merge"];

impl AggregateOperation {
    pub fn new(namespace: Namespace, args: AggregateArgs) -> DbResult<Self> {
        Ok(Self {
            namespace,
            pipeline: to_documents("pipeline", args.pipeline)?,
        })
    }

    pub fn command(&self) -> Document {
        doc! {
            "aggregate": self.namespace.collection.as_str(),
            "pipeline": self.pipeline.clone(),
            "cursor": {},
        }
    }
}

impl TryFrom<AggregateInput> for AggregateOperation {
    type Error = DbError;

    fn try_from(input: AggregateInput) -> DbResult<Self> {
        Self::new(Namespace::new(input.database, input.collection), input.args)
    }
}

#[async_trait]
impl DbOperation for AggregateOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Aggregate
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_namespace(&self.namespace)
    }

    fn is_mutating(&self) -> bool {
        self.pipeline
            .iter()
            .any(|stage| WRITING_STAGES.iter().any(|name| stage.contains_key(*name)))
    }

    fn explain_body(&self) -> Option<Document> {
        Some(self.command())
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let database = &self.namespace.database;
        let documents = driver.run_cursor_command(database, self.command()).await?;

        Ok(ToolOutput::text(format!(
            "Found {} documents in the aggregation result:",
            documents.len()
        ))
        .with_blocks(document_blocks(documents)))
    }
}

// count

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CountArgs {
    /// Filter for the documents to count. Omit to count the whole collection.
    #[serde(default)]
    pub query: Option<JsonObject>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CountInput {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
    #[serde(flatten)]
    pub args: CountArgs,
}

#[derive(Debug, Clone)]
pub struct CountOperation {
    namespace: Namespace,
    query: Document,
}

impl CountOperation {
    pub fn new(namespace: Namespace, args: CountArgs) -> DbResult<Self> {
        Ok(Self {
            namespace,
            query: to_optional_document("query", args.query)?,
        })
    }

    pub fn command(&self) -> Document {
        doc! {
            "count": self.namespace.collection.as_str(),
            "query": self.query.clone(),
        }
    }
}

impl TryFrom<CountInput> for CountOperation {
    type Error = DbError;

    fn try_from(input: CountInput) -> DbResult<Self> {
        Self::new(Namespace::new(input.database, input.collection), input.args)
    }
}

#[async_trait]
impl DbOperation for CountOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Count
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_namespace(&self.namespace)
    }

    fn explain_body(&self) -> Option<Document> {
        Some(self.command())
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let reply = driver
            .run_command(&self.namespace.database, self.command())
            .await?;
        let n = get_number(&reply, "n").unwrap_or_default();
        Ok(ToolOutput::text(format!(
            "Found {n} documents in the collection \"{}\"",
            self.namespace.collection
        )))
    }
}

// collection_schema

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CollectionSchemaInput {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
    /// Number of documents to sample. Default: 50
    #[serde(default = "default_sample_size")]
    pub sample_size: u32,
}

#[derive(Debug, Clone)]
pub struct CollectionSchemaOperation {
    namespace: Namespace,
    sample_size: u32,
}

impl From<CollectionSchemaInput> for CollectionSchemaOperation {
    fn from(input: CollectionSchemaInput) -> Self {
        Self {
            namespace: Namespace::new(input.database, input.collection),
            sample_size: input.sample_size,
        }
    }
}

#[derive(Debug, Default)]
struct FieldStats {
    types: BTreeSet<&'static str>,
    occurrences: usize,
}

fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "Double",
        Bson::String(_) => "String",
        Bson::Array(_) => "Array",
        Bson::Document(_) => "Document",
        Bson::Boolean(_) => "Boolean",
        Bson::Null => "Null",
        Bson::RegularExpression(_) => "RegExp",
        Bson::Int32(_) => "Int32",
        Bson::Int64(_) => "Int64",
        Bson::Timestamp(_) => "Timestamp",
        Bson::Binary(_) => "Binary",
        Bson::ObjectId(_) => "ObjectId",
        Bson::DateTime(_) => "Date",
        Bson::Decimal128(_) => "Decimal128",
        _ => "Other",
    }
}

fn record_fields(prefix: &str, document: &Document, fields: &mut BTreeMap<String, FieldStats>) {
    for (key, value) in document {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let stats = fields.entry(path.clone()).or_default();
        stats.types.insert(bson_type_name(value));
        stats.occurrences += 1;
        if let Bson::Document(nested) = value {
            record_fields(&path, nested, fields);
        }
    }
}

/// Per-field types and the share of sampled documents containing the field.
pub fn infer_schema(documents: &[Document]) -> serde_json::Value {
    let mut fields = BTreeMap::new();
    for document in documents {
        record_fields("", document, &mut fields);
    }

    let total = documents.len().max(1) as f64;
    let schema: serde_json::Map<String, serde_json::Value> = fields
        .into_iter()
        .map(|(path, stats)| {
            (
                path,
                serde_json::json!({
                    "types": stats.types.into_iter().collect::<Vec<_>>(),
                    "probability": stats.occurrences as f64 / total,
                }),
            )
        })
        .collect();
    serde_json::Value::Object(schema)
}

#[async_trait]
impl DbOperation for CollectionSchemaOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::CollectionSchema
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_namespace(&self.namespace)?;
        if self.sample_size == 0 {
            return Err(DbError::validation("`sample_size` must be at least 1"));
        }
        Ok(())
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let database = &self.namespace.database;
        let command = doc! {
            "aggregate": self.namespace.collection.as_str(),
            "pipeline": [ { "$sample": { "size": i64::from(self.sample_size) } } ],
            "cursor": {},
        };
        let documents = driver.run_cursor_command(database, command).await?;

        if documents.is_empty() {
            return Ok(ToolOutput::text(format!(
                "The collection \"{}\" is empty, so no schema could be inferred.",
                self.namespace
            )));
        }

        let schema = infer_schema(&documents);
        let field_count = schema.as_object().map_or(0, |m| m.len());
        Ok(ToolOutput::text(format!(
            "Found {field_count} fields in the schema for \"{}\"",
            self.namespace
        ))
        .with_blocks([schema.to_string()]))
    }
}
