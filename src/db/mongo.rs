//! Driver implementation backed by the official `mongodb` crate.

use crate::db::driver::{Connector, Driver, DriverError, DriverResult};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Convert driver errors, keeping the server's code and message verbatim.
impl From<mongodb::error::Error> for DriverError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Command(command) => DriverError::command(
                command.code,
                command.code_name.clone(),
                command.message.clone(),
            ),
            ErrorKind::Authentication { .. }
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::Io(_)
            | ErrorKind::Shutdown => DriverError::connectivity(err.to_string()),
            _ => DriverError::other(err.to_string()),
        }
    }
}

/// Opens `mongodb::Client`s and verifies them with a `ping`.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    app_name: String,
    connect_timeout: Duration,
}

impl MongoConnector {
    pub fn new(app_name: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            app_name: app_name.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, connection_string: &str) -> DriverResult<Arc<dyn Driver>> {
        let mut options = ClientOptions::parse(connection_string).await?;
        if options.app_name.is_none() {
            options.app_name = Some(self.app_name.clone());
        }
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);

        // Client construction is lazy; the ping surfaces auth and network errors here.
        let client = Client::with_options(options)?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        debug!("MongoDB ping succeeded");

        Ok(Arc::new(MongoDriver { client }))
    }
}

/// A connected `mongodb::Client`.
#[derive(Debug, Clone)]
pub struct MongoDriver {
    client: Client,
}

#[async_trait]
impl Driver for MongoDriver {
    async fn run_command(&self, database: &str, command: Document) -> DriverResult<Document> {
        Ok(self.client.database(database).run_command(command).await?)
    }

    /// The driver's cursor keeps the originating implicit session and
    /// mongos pinned for every `getMore`.
    async fn run_cursor_command(
        &self,
        database: &str,
        command: Document,
    ) -> DriverResult<Vec<Document>> {
        let cursor = self
            .client
            .database(database)
            .run_cursor_command(command)
            .await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents)
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}
