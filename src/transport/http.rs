//! HTTP transport with Streamable HTTP support for the MCP server.
//!
//! Every HTTP session gets its own clone of the service; the connection
//! manager, executor and log sinks behind it are shared.

use crate::error::{DbError, DbResult};
use crate::mcp::MongoService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info, warn};

const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    service: MongoService,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
    /// MCP endpoint path
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        service: MongoService,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            service,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the MCP endpoint path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn router(&self) -> axum::Router {
        let prototype = self.service.clone();
        let mcp = StreamableHttpService::new(
            move || Ok(prototype.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service rejects "/"
        if self.endpoint == "/" {
            axum::Router::new().fallback_service(mcp)
        } else {
            axum::Router::new().nest_service(&self.endpoint, mcp)
        }
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::configuration(format!(
                "Cannot listen on {bind_addr}: {e}. Pick another --http-port or --http-host"
            ))
        })?;
        info!(address = %bind_addr, endpoint = %self.endpoint, "Serving MCP over HTTP");

        let draining = Arc::new(Notify::new());
        let on_signal = draining.clone();
        let server = axum::serve(listener, self.router()).with_graceful_shutdown(async move {
            wait_for_signal().await;
            on_signal.notify_one();
        });
        let mut server = std::pin::pin!(server.into_future());

        let outcome = tokio::select! {
            result = &mut server => result,
            _ = draining.notified() => {
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Draining HTTP sessions (signal again to stop now)"
                );
                tokio::select! {
                    result = &mut server => result,
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("HTTP sessions still open after the drain timeout");
                        Ok(())
                    }
                    _ = wait_for_signal() => {
                        warn!("Second signal, dropping open HTTP sessions");
                        Ok(())
                    }
                }
            }
        };

        self.service.shutdown().await;
        outcome.map_err(|e| {
            error!(error = %e, "HTTP server failed");
            DbError::internal(format!("HTTP server error: {e}"))
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
