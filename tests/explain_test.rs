//! Integration tests for the explain tool.

mod common;

use common::{Harness, collscan_plan};
use mongo_mcp_server::DbError;
use mongo_mcp_server::tools::ExecutorSettings;
use mongo_mcp_server::tools::explain::{ExplainInput, ExplainOperation};
use serde_json::json;

fn explain(value: serde_json::Value) -> Result<ExplainOperation, DbError> {
    let input: ExplainInput = serde_json::from_value(value).unwrap();
    ExplainOperation::try_from(input)
}

#[tokio::test]
async fn test_explain_find_runs_a_single_explain_command() {
    let harness = Harness::new(ExecutorSettings::default());
    harness.driver.reply("explain", collscan_plan());

    let operation = explain(json!({
        "database": "shop",
        "collection": "orders",
        "method": [{ "name": "find", "arguments": { "filter": { "status": "new" } } }],
    }))
    .unwrap();

    let output = harness.executor.run(&operation).await.unwrap();

    let commands = harness.driver.commands();
    assert_eq!(commands.len(), 1);
    let (database, command) = &commands[0];
    assert_eq!(database, "shop");
    assert_eq!(command.get_str("verbosity").unwrap(), "queryPlanner");
    let body = command.get_document("explain").unwrap();
    assert_eq!(body.get_str("find").unwrap(), "orders");

    assert_eq!(output.blocks.len(), 2);
    assert!(output.blocks[0].contains("`find`"));
    assert!(output.blocks[1].contains("COLLSCAN"));
}

#[tokio::test]
async fn test_explain_count_honours_verbosity() {
    let harness = Harness::new(ExecutorSettings::default());
    let operation = explain(json!({
        "database": "shop",
        "collection": "orders",
        "method": [{ "name": "count", "arguments": { "query": { "qty": { "$gt": 5 } } } }],
        "verbosity": "executionStats",
    }))
    .unwrap();

    harness.executor.run(&operation).await.unwrap();

    let (_, command) = &harness.driver.commands()[0];
    assert_eq!(command.get_str("verbosity").unwrap(), "executionStats");
    assert_eq!(
        command.get_document("explain").unwrap().get_str("count").unwrap(),
        "orders"
    );
}

#[test]
fn test_explain_without_method_names_every_option() {
    let err = explain(json!({
        "database": "shop",
        "collection": "orders",
        "method": [],
    }))
    .unwrap_err();

    assert!(matches!(err, DbError::Validation { .. }));
    let text = err.to_string();
    assert!(text.contains("Exactly one method must be provided"));
    for name in ["`aggregate`", "`find`", "`count`"] {
        assert!(text.contains(name), "missing {name} in {text}");
    }
}

#[test]
fn test_explain_with_two_methods_is_rejected() {
    let err = explain(json!({
        "database": "shop",
        "collection": "orders",
        "method": [
            { "name": "find", "arguments": {} },
            { "name": "count", "arguments": {} },
        ],
    }))
    .unwrap_err();

    assert!(matches!(err, DbError::Validation { .. }));
}

#[test]
fn test_unknown_method_fails_to_parse() {
    let parsed: Result<ExplainInput, _> = serde_json::from_value(json!({
        "database": "shop",
        "collection": "orders",
        "method": [{ "name": "distinct", "arguments": {} }],
    }));
    assert!(parsed.is_err());
}
