//! Create and write tools: `insert_many`, `create_index`,
//! `create_collection`, `update_many`, `rename_collection`.

use crate::db::{Driver, DriverResult, Namespace, check_write_errors, get_number};
use crate::error::{DbError, DbResult};
use crate::tools::format::{JsonObject, to_document, to_documents, to_extjson, to_optional_document};
use crate::tools::pipeline::{DbOperation, OperationKind, ToolOutput, require_name};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use schemars::JsonSchema;
use serde::Deserialize;

fn require_namespace(namespace: &Namespace) -> DbResult<()> {
    require_name("database", &namespace.database)?;
    require_name("collection", &namespace.collection)
}

// insert_many

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InsertManyInput {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
    /// Documents to insert, in MongoDB extended JSON
    pub documents: Vec<JsonObject>,
}

#[derive(Debug, Clone)]
pub struct InsertManyOperation {
    namespace: Namespace,
    documents: Vec<Document>,
}

impl TryFrom<InsertManyInput> for InsertManyOperation {
    type Error = DbError;

    fn try_from(input: InsertManyInput) -> DbResult<Self> {
        let mut documents = to_documents("documents", input.documents)?;
        // Assigned here so the inserted ids can be reported back.
        for document in &mut documents {
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
        }
        Ok(Self {
            namespace: Namespace::new(input.database, input.collection),
            documents,
        })
    }
}

#[async_trait]
impl DbOperation for InsertManyOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::InsertMany
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_namespace(&self.namespace)?;
        if self.documents.is_empty() {
            return Err(DbError::validation("`documents` must contain at least one document"));
        }
        Ok(())
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let command = doc! {
            "insert": self.namespace.collection.as_str(),
            "documents": self.documents.clone(),
            "ordered": true,
        };
        let reply = driver.run_command(&self.namespace.database, command).await?;
        check_write_errors(&reply)?;

        let inserted = get_number(&reply, "n").unwrap_or_default();
        let ids: Vec<Bson> = self
            .documents
            .iter()
            .filter_map(|d| d.get("_id").cloned())
            .collect();
        Ok(ToolOutput::text(format!(
            "Inserted {inserted} document(s) into collection \"{}\"",
            self.namespace.collection
        ))
        .with_blocks([format!(
            "Inserted IDs: {}",
            to_extjson(doc! { "ids": ids })
        )]))
    }
}

// create_index

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateIndexInput {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
    /// Index key specification, e.g. {"email": 1}
    pub keys: JsonObject,
    /// Index name. Generated from the keys when omitted.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateIndexOperation {
    namespace: Namespace,
    keys: Document,
    name: String,
}

/// Name the server would give an index with these keys, e.g. `a_1_b_-1`.
pub fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| {
            let direction = match direction {
                Bson::String(s) => s.clone(),
                Bson::Int32(n) => n.to_string(),
                Bson::Int64(n) => n.to_string(),
                Bson::Double(n) => n.to_string(),
                other => other.to_string(),
            };
            format!("{field}_{direction}")
        })
        .collect::<Vec<_>>()
        .join("_")
}

impl TryFrom<CreateIndexInput> for CreateIndexOperation {
    type Error = DbError;

    fn try_from(input: CreateIndexInput) -> DbResult<Self> {
        let keys = to_document("keys", input.keys)?;
        let name = input.name.unwrap_or_else(|| default_index_name(&keys));
        Ok(Self {
            namespace: Namespace::new(input.database, input.collection),
            keys,
            name,
        })
    }
}

#[async_trait]
impl DbOperation for CreateIndexOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::CreateIndex
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_namespace(&self.namespace)?;
        if self.keys.is_empty() {
            return Err(DbError::validation("`keys` must name at least one field"));
        }
        Ok(())
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let command = doc! {
            "createIndexes": self.namespace.collection.as_str(),
            "indexes": [ { "key": self.keys.clone(), "name": self.name.as_str() } ],
        };
        driver.run_command(&self.namespace.database, command).await?;
        Ok(ToolOutput::text(format!(
            "Created the index \"{}\" on collection \"{}\" in database \"{}\"",
            self.name, self.namespace.collection, self.namespace.database
        )))
    }
}

// create_collection

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateCollectionInput {
    /// Database name. Created implicitly if it does not exist.
    pub database: String,
    /// Name of the new collection
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct CreateCollectionOperation {
    namespace: Namespace,
}

impl From<CreateCollectionInput> for CreateCollectionOperation {
    fn from(input: CreateCollectionInput) -> Self {
        Self {
            namespace: Namespace::new(input.database, input.collection),
        }
    }
}

#[async_trait]
impl DbOperation for CreateCollectionOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::CreateCollection
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_namespace(&self.namespace)
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let command = doc! { "create": self.namespace.collection.as_str() };
        driver.run_command(&self.namespace.database, command).await?;
        Ok(ToolOutput::text(format!(
            "Collection \"{}\" created in database \"{}\".",
            self.namespace.collection, self.namespace.database
        )))
    }
}

// update_many

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateManyInput {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
    /// Filter selecting the documents to update. Omit to update every document.
    #[serde(default)]
    pub filter: Option<JsonObject>,
    /// Update document, e.g. {"$set": {"status": "closed"}}
    pub update: JsonObject,
    /// Insert a document when nothing matches the filter
    #[serde(default)]
    pub upsert: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateManyOperation {
    namespace: Namespace,
    filter: Document,
    update: Document,
    upsert: bool,
}

impl UpdateManyOperation {
    pub fn command(&self) -> Document {
        doc! {
            "update": self.namespace.collection.as_str(),
            "updates": [ {
                "q": self.filter.clone(),
                "u": self.update.clone(),
                "multi": true,
                "upsert": self.upsert,
            } ],
        }
    }
}

impl TryFrom<UpdateManyInput> for UpdateManyOperation {
    type Error = DbError;

    fn try_from(input: UpdateManyInput) -> DbResult<Self> {
        Ok(Self {
            namespace: Namespace::new(input.database, input.collection),
            filter: to_optional_document("filter", input.filter)?,
            update: to_document("update", input.update)?,
            upsert: input.upsert,
        })
    }
}

#[async_trait]
impl DbOperation for UpdateManyOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::UpdateMany
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_namespace(&self.namespace)?;
        if self.update.is_empty() {
            return Err(DbError::validation("`update` must not be empty"));
        }
        if !self.update.keys().all(|k| k.starts_with('$')) {
            return Err(DbError::validation(
                "`update` may only contain update operators such as $set or $inc",
            ));
        }
        Ok(())
    }

    fn explain_body(&self) -> Option<Document> {
        Some(self.command())
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let reply = driver
            .run_command(&self.namespace.database, self.command())
            .await?;
        check_write_errors(&reply)?;

        let upserted: Vec<Bson> = reply
            .get_array("upserted")
            .map(|items| {
                items
                    .iter()
                    .filter_map(|u| u.as_document().and_then(|d| d.get("_id").cloned()))
                    .collect()
            })
            .unwrap_or_default();
        let matched = get_number(&reply, "n").unwrap_or_default() - upserted.len() as i64;
        let modified = get_number(&reply, "nModified").unwrap_or_default();

        if matched == 0 && upserted.is_empty() {
            return Ok(ToolOutput::text("No documents matched the filter."));
        }

        let mut summary = format!("Matched {matched} document(s). Modified {modified} document(s).");
        if let Some(id) = upserted.into_iter().next() {
            summary.push_str(&format!(
                " Upserted 1 document with id: {}.",
                id.into_canonical_extjson()
            ));
        }
        Ok(ToolOutput::text(summary))
    }
}

// rename_collection

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RenameCollectionInput {
    /// Database name
    pub database: String,
    /// Current collection name
    pub collection: String,
    /// New collection name
    pub new_name: String,
    /// Drop an existing collection named `new_name` first
    #[serde(default)]
    pub drop_target: bool,
}

#[derive(Debug, Clone)]
pub struct RenameCollectionOperation {
    namespace: Namespace,
    new_name: String,
    drop_target: bool,
}

impl From<RenameCollectionInput> for RenameCollectionOperation {
    fn from(input: RenameCollectionInput) -> Self {
        Self {
            namespace: Namespace::new(input.database, input.collection),
            new_name: input.new_name,
            drop_target: input.drop_target,
        }
    }
}

#[async_trait]
impl DbOperation for RenameCollectionOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::RenameCollection
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_namespace(&self.namespace)?;
        require_name("new_name", &self.new_name)
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let target = Namespace::new(self.namespace.database.as_str(), self.new_name.as_str());
        let command = doc! {
            "renameCollection": self.namespace.to_string(),
            "to": target.to_string(),
            "dropTarget": self.drop_target,
        };
        driver.run_command("admin", command).await?;
        Ok(ToolOutput::text(format!(
            "Collection \"{}\" renamed to \"{}\" in database \"{}\".",
            self.namespace.collection, self.new_name, self.namespace.database
        )))
    }
}
