//! Connection Manager.
//!
//! Owns the single process-wide connection to the configured deployment.
//! `ensure_connected` is single-flight: the first caller starts a detached
//! connect task and every concurrent caller awaits the same shared outcome.
//! Dropping a waiter never cancels the attempt.

use crate::db::driver::{Connector, Driver};
use crate::error::{CONNECT_SUGGESTION, DbError, DbResult};
use crate::logging::{CompositeLogger, LogId};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const CONTEXT: &str = "connection";

/// Externally visible connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

/// Outcome of one connect task, shared by everyone waiting on it.
type Attempt = Shared<BoxFuture<'static, Result<Arc<dyn Driver>, String>>>;

enum ConnectionState {
    Disconnected,
    Connecting(Attempt),
    Connected(Arc<dyn Driver>),
    Failed(String),
}

struct Inner {
    state: ConnectionState,
    connection_string: Option<String>,
    /// Bumped when an attempt starts or the target changes; a finishing
    /// attempt only publishes its result if the generation is unchanged.
    generation: u64,
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    logger: Arc<CompositeLogger>,
    inner: Arc<RwLock<Inner>>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        connection_string: Option<String>,
        logger: Arc<CompositeLogger>,
    ) -> Self {
        Self {
            connector,
            logger,
            inner: Arc::new(RwLock::new(Inner {
                state: ConnectionState::Disconnected,
                connection_string,
                generation: 0,
            })),
        }
    }

    pub async fn status(&self) -> ConnectionStatus {
        match &self.inner.read().await.state {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Connecting(_) => ConnectionStatus::Connecting,
            ConnectionState::Connected(_) => ConnectionStatus::Connected,
            ConnectionState::Failed(message) => ConnectionStatus::Failed(message.clone()),
        }
    }

    pub async fn has_target(&self) -> bool {
        self.inner.read().await.connection_string.is_some()
    }

    /// Return the live driver, connecting first if needed.
    pub async fn ensure_connected(&self) -> DbResult<Arc<dyn Driver>> {
        if let ConnectionState::Connected(driver) = &self.inner.read().await.state {
            return Ok(Arc::clone(driver));
        }

        let attempt = {
            let mut inner = self.inner.write().await;
            match &inner.state {
                ConnectionState::Connected(driver) => return Ok(Arc::clone(driver)),
                ConnectionState::Connecting(attempt) => attempt.clone(),
                ConnectionState::Disconnected | ConnectionState::Failed(_) => {
                    let Some(connection_string) = inner.connection_string.clone() else {
                        return Err(DbError::not_connected());
                    };
                    self.start_attempt(&mut inner, connection_string)
                }
            }
        };

        attempt
            .await
            .map_err(|message| DbError::connection(message, CONNECT_SUGGESTION))
    }

    /// Switch to a new deployment, closing the current connection first.
    /// An attempt still in flight for the old target is superseded.
    pub async fn connect_to(&self, connection_string: &str) -> DbResult<Arc<dyn Driver>> {
        let (previous, attempt) = {
            let mut inner = self.inner.write().await;
            inner.connection_string = Some(connection_string.to_string());
            let previous = std::mem::replace(&mut inner.state, ConnectionState::Disconnected);
            let attempt = self.start_attempt(&mut inner, connection_string.to_string());
            (previous, attempt)
        };
        if let ConnectionState::Connected(driver) = previous {
            driver.close().await;
            self.logger
                .info(LogId::DISCONNECTED, CONTEXT, "Closed previous connection")
                .await;
        }

        attempt
            .await
            .map_err(|message| DbError::connection(message, CONNECT_SUGGESTION))
    }

    /// Close the live connection, if any. The target is kept so a later
    /// `ensure_connected` reconnects.
    pub async fn close(&self) {
        let previous = {
            let mut inner = self.inner.write().await;
            inner.generation += 1;
            std::mem::replace(&mut inner.state, ConnectionState::Disconnected)
        };
        if let ConnectionState::Connected(driver) = previous {
            driver.close().await;
            info!("MongoDB connection closed");
            self.logger
                .info(LogId::DISCONNECTED, CONTEXT, "Disconnected from MongoDB")
                .await;
        }
    }

    /// Spawn the connect task and record it as the current attempt.
    /// Must be called with the state write lock held.
    fn start_attempt(&self, inner: &mut Inner, connection_string: String) -> Attempt {
        inner.generation += 1;
        let task = tokio::spawn(dial(
            Arc::clone(&self.connector),
            Arc::clone(&self.logger),
            Arc::clone(&self.inner),
            connection_string,
            inner.generation,
        ));
        let attempt = async move {
            task.await
                .unwrap_or_else(|e| Err(format!("Connect task did not complete: {e}")))
        }
        .boxed()
        .shared();
        inner.state = ConnectionState::Connecting(attempt.clone());
        attempt
    }
}

/// One connect attempt. Runs to completion even if nobody awaits it.
async fn dial(
    connector: Arc<dyn Connector>,
    logger: Arc<CompositeLogger>,
    inner: Arc<RwLock<Inner>>,
    connection_string: String,
    generation: u64,
) -> Result<Arc<dyn Driver>, String> {
    debug!("Connecting to MongoDB");
    logger
        .info(LogId::CONNECT_STARTED, CONTEXT, "Connecting to MongoDB")
        .await;

    let result = connector.connect(&connection_string).await;

    let mut guard = inner.write().await;
    if guard.generation != generation {
        drop(guard);
        if let Ok(driver) = result {
            driver.close().await;
        }
        return Err("The connection request was superseded by a newer connect or close".into());
    }

    match result {
        Ok(driver) => {
            guard.state = ConnectionState::Connected(Arc::clone(&driver));
            drop(guard);
            info!("Connected to MongoDB");
            logger
                .info(LogId::CONNECT_SUCCEEDED, CONTEXT, "Connected to MongoDB")
                .await;
            Ok(driver)
        }
        Err(e) => {
            let message = format!("Failed to connect to MongoDB: {}", e.message);
            guard.state = ConnectionState::Failed(message.clone());
            drop(guard);
            logger.error(LogId::CONNECT_FAILED, CONTEXT, message.clone()).await;
            Err(message)
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::{DriverError, DriverResult};
    use crate::logging::ConsoleSink;
    use crate::logging::Redactor;
    use async_trait::async_trait;
    use mongodb::bson::{Document, doc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NoopDriver;

    #[async_trait]
    impl Driver for NoopDriver {
        async fn run_command(&self, _: &str, _: Document) -> DriverResult<Document> {
            Ok(doc! { "ok": 1 })
        }
        async fn close(&self) {}
    }

    #[derive(Default)]
    struct CountingConnector {
        attempts: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, _: &str) -> DriverResult<Arc<dyn Driver>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(DriverError::connectivity("connection refused"));
            }
            Ok(Arc::new(NoopDriver))
        }
    }

    fn logger() -> Arc<CompositeLogger> {
        let sink = Arc::new(ConsoleSink::new(Redactor::default()));
        Arc::new(CompositeLogger::new(vec![sink]).unwrap())
    }

    fn manager(connector: Arc<CountingConnector>, target: Option<&str>) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            connector,
            target.map(String::from),
            logger(),
        ))
    }

    #[tokio::test]
    async fn test_concurrent_ensure_connects_once() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(connector.clone(), Some("mongodb://localhost"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.ensure_connected().await.unwrap() })
            })
            .collect();

        let mut drivers = Vec::new();
        for handle in handles {
            drivers.push(handle.await.unwrap());
        }

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert!(drivers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(manager.status().await, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_missing_target_is_connection_error() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(connector.clone(), None);

        let err = manager.ensure_connected().await.err().unwrap();
        assert!(matches!(err, DbError::Connection { .. }));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failed_attempt() {
        let connector = Arc::new(CountingConnector {
            fail: true,
            ..Default::default()
        });
        let manager = manager(connector.clone(), Some("mongodb://localhost"));

        let (a, b) = tokio::join!(manager.ensure_connected(), manager.ensure_connected());
        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(manager.status().await, ConnectionStatus::Failed(_)));

        // A later call retries.
        assert!(manager.ensure_connected().await.is_err());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_close_then_reconnect() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(connector.clone(), Some("mongodb://localhost"));

        manager.ensure_connected().await.unwrap();
        manager.close().await;
        assert_eq!(manager.status().await, ConnectionStatus::Disconnected);

        manager.ensure_connected().await.unwrap();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel_the_attempt() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(connector.clone(), Some("mongodb://localhost"));

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_connected().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        first.abort();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(manager.status().await, ConnectionStatus::Connected);

        manager.ensure_connected().await.unwrap();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiter_joins_attempt_left_by_abandoned_caller() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(connector.clone(), Some("mongodb://localhost"));

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_connected().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        first.abort();
        assert_eq!(manager.status().await, ConnectionStatus::Connecting);

        manager.ensure_connected().await.unwrap();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_during_attempt_discards_its_result() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(connector.clone(), Some("mongodb://localhost"));

        let (result, _) = tokio::join!(manager.ensure_connected(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            manager.close().await;
        });

        assert!(result.is_err());
        assert_eq!(manager.status().await, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_to_sets_target() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(connector.clone(), None);
        assert!(!manager.has_target().await);

        manager.connect_to("mongodb://other").await.unwrap();
        assert!(manager.has_target().await);
        assert_eq!(manager.status().await, ConnectionStatus::Connected);
    }
}
