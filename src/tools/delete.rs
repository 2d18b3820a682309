//! Delete and drop tools: `delete_many`, `drop_collection`, `drop_database`.

use crate::db::{Driver, DriverResult, Namespace, check_write_errors, get_number};
use crate::error::{DbError, DbResult};
use crate::tools::format::{JsonObject, to_optional_document};
use crate::tools::pipeline::{DbOperation, OperationKind, ToolOutput, require_name};
use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteManyInput {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
    /// Filter selecting the documents to delete. Omit to delete every document.
    #[serde(default)]
    pub filter: Option<JsonObject>,
}

#[derive(Debug, Clone)]
pub struct DeleteManyOperation {
    namespace: Namespace,
    filter: Document,
}

impl DeleteManyOperation {
    /// `limit: 0` removes every match.
    pub fn command(&self) -> Document {
        doc! {
            "delete": self.namespace.collection.as_str(),
            "deletes": [ { "q": self.filter.clone(), "limit": 0 } ],
        }
    }
}

impl TryFrom<DeleteManyInput> for DeleteManyOperation {
    type Error = DbError;

    fn try_from(input: DeleteManyInput) -> DbResult<Self> {
        Ok(Self {
            namespace: Namespace::new(input.database, input.collection),
            filter: to_optional_document("filter", input.filter)?,
        })
    }
}

#[async_trait]
impl DbOperation for DeleteManyOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::DeleteMany
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_name("database", &self.namespace.database)?;
        require_name("collection", &self.namespace.collection)
    }

    fn explain_body(&self) -> Option<Document> {
        Some(self.command())
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let reply = driver
            .run_command(&self.namespace.database, self.command())
            .await?;
        check_write_errors(&reply)?;
        let deleted = get_number(&reply, "n").unwrap_or_default();
        Ok(ToolOutput::text(format!(
            "Deleted {deleted} document(s) from collection \"{}\"",
            self.namespace.collection
        )))
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DropCollectionInput {
    /// Database name
    pub database: String,
    /// Collection to drop, together with its indexes
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct DropCollectionOperation {
    namespace: Namespace,
}

impl From<DropCollectionInput> for DropCollectionOperation {
    fn from(input: DropCollectionInput) -> Self {
        Self {
            namespace: Namespace::new(input.database, input.collection),
        }
    }
}

#[async_trait]
impl DbOperation for DropCollectionOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::DropCollection
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_name("database", &self.namespace.database)?;
        require_name("collection", &self.namespace.collection)
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let command = doc! { "drop": self.namespace.collection.as_str() };
        driver.run_command(&self.namespace.database, command).await?;
        Ok(ToolOutput::text(format!(
            "Successfully dropped collection \"{}\" from database \"{}\"",
            self.namespace.collection, self.namespace.database
        )))
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DropDatabaseInput {
    /// Database to drop, with all of its collections
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct DropDatabaseOperation {
    namespace: Namespace,
}

impl From<DropDatabaseInput> for DropDatabaseOperation {
    fn from(input: DropDatabaseInput) -> Self {
        Self {
            namespace: Namespace::database(input.database),
        }
    }
}

#[async_trait]
impl DbOperation for DropDatabaseOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::DropDatabase
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        require_name("database", &self.namespace.database)
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        driver
            .run_command(&self.namespace.database, doc! { "dropDatabase": 1 })
            .await?;
        Ok(ToolOutput::text(format!(
            "Successfully dropped database \"{}\"",
            self.namespace.database
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delete_command_removes_all_matches() {
        let op = DeleteManyOperation::try_from(DeleteManyInput {
            database: "shop".into(),
            collection: "orders".into(),
            filter: json!({ "status": "void" }).as_object().cloned(),
        })
        .unwrap();
        let command = op.command();
        let delete = command.get_array("deletes").unwrap()[0].as_document().unwrap();
        assert_eq!(delete.get_i32("limit").unwrap(), 0);
        assert_eq!(delete.get_document("q").unwrap().get_str("status").unwrap(), "void");
        assert_eq!(op.explain_body(), Some(command));
    }

    #[test]
    fn test_drop_database_requires_name() {
        let op = DropDatabaseOperation::from(DropDatabaseInput {
            database: "".into(),
        });
        assert!(op.validate().is_err());
    }
}
