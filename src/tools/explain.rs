//! Explain Dispatcher.
//!
//! The `explain` tool takes exactly one `{name, arguments}` method entry and
//! builds the same command the matching tool would run, wrapped in
//! `explain`.

use crate::db::{Driver, DriverError, DriverResult, Namespace};
use crate::error::{DbError, DbResult};
use crate::tools::format::to_extjson;
use crate::tools::index_check::explain_command;
use crate::tools::pipeline::{DbOperation, OperationKind, ToolOutput};
use crate::tools::read::{
    AggregateArgs, AggregateOperation, CountArgs, CountOperation, FindArgs, FindOperation,
};
use async_trait::async_trait;
use mongodb::bson::Document;
use schemars::JsonSchema;
use serde::Deserialize;

/// The operation to explain, keyed by `name`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(tag = "name", content = "arguments", rename_all = "lowercase")]
pub enum ExplainMethod {
    Aggregate(AggregateArgs),
    Find(FindArgs),
    Count(CountArgs),
}

impl ExplainMethod {
    pub const NAMES: [&'static str; 3] = ["aggregate", "find", "count"];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aggregate(_) => "aggregate",
            Self::Find(_) => "find",
            Self::Count(_) => "count",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ExplainVerbosity {
    #[default]
    QueryPlanner,
    QueryPlannerExtended,
    ExecutionStats,
    AllPlansExecution,
}

impl ExplainVerbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryPlanner => "queryPlanner",
            Self::QueryPlannerExtended => "queryPlannerExtended",
            Self::ExecutionStats => "executionStats",
            Self::AllPlansExecution => "allPlansExecution",
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExplainInput {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
    /// Exactly one method to explain, e.g. [{"name": "find", "arguments": {"filter": {}}}]
    pub method: Vec<ExplainMethod>,
    /// Explain verbosity. Default: queryPlanner
    #[serde(default)]
    pub verbosity: ExplainVerbosity,
}

#[derive(Debug, Clone)]
enum ExplainTarget {
    Aggregate(AggregateOperation),
    Find(FindOperation),
    Count(CountOperation),
}

impl ExplainTarget {
    fn operation(&self) -> &dyn DbOperation {
        match self {
            Self::Aggregate(op) => op,
            Self::Find(op) => op,
            Self::Count(op) => op,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExplainOperation {
    namespace: Namespace,
    method: &'static str,
    target: ExplainTarget,
    verbosity: ExplainVerbosity,
}

impl ExplainOperation {
    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn command(&self) -> DbResult<Document> {
        let body = self
            .target
            .operation()
            .explain_body()
            .ok_or_else(|| DbError::internal(format!("{} cannot be explained", self.method)))?;
        Ok(explain_command(body, self.verbosity.as_str()))
    }
}

impl TryFrom<ExplainInput> for ExplainOperation {
    type Error = DbError;

    fn try_from(input: ExplainInput) -> DbResult<Self> {
        let mut methods = input.method.into_iter();
        let (Some(method), None) = (methods.next(), methods.next()) else {
            return Err(DbError::validation(format!(
                "Exactly one method must be provided. Expected one of the following: {}",
                ExplainMethod::NAMES
                    .iter()
                    .map(|n| format!("`{n}`"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        };

        let namespace = Namespace::new(input.database, input.collection);
        let name = method.name();
        let target = match method {
            ExplainMethod::Aggregate(args) => {
                ExplainTarget::Aggregate(AggregateOperation::new(namespace.clone(), args)?)
            }
            ExplainMethod::Find(args) => {
                ExplainTarget::Find(FindOperation::new(namespace.clone(), args)?)
            }
            ExplainMethod::Count(args) => {
                ExplainTarget::Count(CountOperation::new(namespace.clone(), args)?)
            }
        };

        Ok(Self {
            namespace,
            method: name,
            target,
            verbosity: input.verbosity,
        })
    }
}

#[async_trait]
impl DbOperation for ExplainOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Explain
    }

    fn namespace(&self) -> Namespace {
        self.namespace.clone()
    }

    fn validate(&self) -> DbResult<()> {
        self.target.operation().validate()?;
        self.command().map(|_| ())
    }

    async fn execute(&self, driver: &dyn Driver) -> DriverResult<ToolOutput> {
        let command = self
            .command()
            .map_err(|e| DriverError::other(e.to_string()))?;
        let plan = driver.run_command(&self.namespace.database, command).await?;

        Ok(ToolOutput::text(format!(
            "Here is some information about the winning plan chosen by the query optimizer \
             for running the given `{}` operation in \"{}\". This information can be used to \
             understand how the query was executed and to optimize the query performance.",
            self.method, self.namespace
        ))
        .with_blocks([to_extjson(plan)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ExplainInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_method_names_every_option() {
        let err = ExplainOperation::try_from(parse(json!({
            "database": "shop",
            "collection": "orders",
            "method": [],
        })))
        .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        let message = err.to_string();
        for name in ExplainMethod::NAMES {
            assert!(message.contains(name), "{message} should mention {name}");
        }
    }

    #[test]
    fn test_multiple_methods_rejected() {
        let err = ExplainOperation::try_from(parse(json!({
            "database": "shop",
            "collection": "orders",
            "method": [
                { "name": "count", "arguments": {} },
                { "name": "find", "arguments": {} },
            ],
        })))
        .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }

    #[test]
    fn test_find_method_builds_explain_command() {
        let op = ExplainOperation::try_from(parse(json!({
            "database": "shop",
            "collection": "orders",
            "method": [ { "name": "find", "arguments": { "filter": { "status": "open" } } } ],
        })))
        .unwrap();
        assert_eq!(op.method(), "find");

        let command = op.command().unwrap();
        assert_eq!(command.get_str("verbosity").unwrap(), "queryPlanner");
        let body = command.get_document("explain").unwrap();
        assert_eq!(body.get_str("find").unwrap(), "orders");
        assert_eq!(body.get_i64("limit").unwrap(), 10);
    }

    #[test]
    fn test_aggregate_with_verbosity() {
        let op = ExplainOperation::try_from(parse(json!({
            "database": "shop",
            "collection": "orders",
            "method": [ { "name": "aggregate", "arguments": { "pipeline": [ { "$match": {} } ] } } ],
            "verbosity": "executionStats",
        })))
        .unwrap();
        let command = op.command().unwrap();
        assert_eq!(command.get_str("verbosity").unwrap(), "executionStats");
        assert!(command.get_document("explain").unwrap().contains_key("aggregate"));
    }

    #[test]
    fn test_unknown_method_fails_to_parse() {
        let result: Result<ExplainInput, _> = serde_json::from_value(json!({
            "database": "shop",
            "collection": "orders",
            "method": [ { "name": "distinct", "arguments": {} } ],
        }));
        assert!(result.is_err());
    }
}
