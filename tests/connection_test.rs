//! Integration tests for lazy, single-flight connection establishment.

mod common;

use common::{Harness, ScriptedConnector, ScriptedDriver, TEST_URI, cursor_reply};
use mongo_mcp_server::DbError;
use mongo_mcp_server::db::{ConnectionManager, ConnectionStatus};
use mongo_mcp_server::logging::CompositeLogger;
use mongo_mcp_server::tools::ExecutorSettings;
use mongo_mcp_server::tools::metadata::ListDatabasesOperation;
use mongodb::bson::doc;
use std::sync::Arc;

fn manager(connector: Arc<ScriptedConnector>, target: Option<&str>) -> Arc<ConnectionManager> {
    let logger = Arc::new(CompositeLogger::new(vec![common::MemorySink::new()]).unwrap());
    Arc::new(ConnectionManager::new(
        connector,
        target.map(str::to_string),
        logger,
    ))
}

#[tokio::test]
async fn test_concurrent_tools_share_one_connection_attempt() {
    let harness = Arc::new(Harness::new(ExecutorSettings::default()));
    harness.driver.reply(
        "listDatabases",
        doc! { "databases": [ { "name": "shop", "sizeOnDisk": 8192_i64 } ], "ok": 1 },
    );

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let harness = harness.clone();
            tokio::spawn(async move { harness.executor.run(&ListDatabasesOperation).await })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(harness.connector.dial_count(), 1);
}

#[tokio::test]
async fn test_concurrent_waiters_share_a_failed_attempt() {
    let connector = ScriptedConnector::failing("connection refused");
    let manager = manager(connector.clone(), Some(TEST_URI));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_connected().await })
        })
        .collect();

    for task in tasks {
        let err = task.await.unwrap().err().unwrap();
        assert!(matches!(err, DbError::Connection { .. }));
    }
    assert_eq!(connector.dial_count(), 1);
    assert!(matches!(manager.status().await, ConnectionStatus::Failed(_)));
}

#[tokio::test]
async fn test_without_target_tools_ask_for_connect() {
    let connector = ScriptedConnector::new(ScriptedDriver::new());
    let manager = manager(connector.clone(), None);

    let err = manager.ensure_connected().await.err().unwrap();

    assert!(matches!(err, DbError::Connection { .. }));
    assert!(err.suggestion().unwrap().contains("connect"));
    assert_eq!(connector.dial_count(), 0);
}

#[tokio::test]
async fn test_connect_to_enables_later_tools() {
    let driver = ScriptedDriver::new();
    driver.reply("find", cursor_reply("shop.orders", Vec::new()));
    let connector = ScriptedConnector::new(driver);
    let manager = manager(connector.clone(), None);

    manager.connect_to(TEST_URI).await.unwrap();
    manager.ensure_connected().await.unwrap();

    assert_eq!(connector.dial_count(), 1);
    assert_eq!(manager.status().await, ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_cancelled_tool_call_leaves_connection_usable() {
    let connector = ScriptedConnector::new(ScriptedDriver::new());
    let manager = manager(connector.clone(), Some(TEST_URI));

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.ensure_connected().await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(3)).await;
    first.abort();
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    assert_eq!(manager.status().await, ConnectionStatus::Connected);
    manager.ensure_connected().await.unwrap();
    assert_eq!(connector.dial_count(), 1);
}
