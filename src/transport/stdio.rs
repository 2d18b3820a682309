//! Stdio transport for the MCP server.
//!
//! This transport uses standard input/output for communication,
//! which is the standard mode for CLI-based MCP integrations.

use crate::error::{DbError, DbResult};
use crate::mcp::MongoService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use tracing::{info, warn};

/// Stdio transport implementation.
///
/// This transport reads JSON-RPC messages from stdin and writes
/// responses to stdout. Application logs never go to stdout.
pub struct StdioTransport {
    service: MongoService,
}

impl StdioTransport {
    pub fn new(service: MongoService) -> Self {
        Self { service }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        let running = self
            .service
            .clone()
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("Failed to start stdio transport: {e}")))?;
        info!("Serving MCP over stdio");

        let outcome = tokio::select! {
            result = running.waiting() => Some(result),
            _ = wait_for_signal() => None,
        };

        self.service.shutdown().await;

        match outcome {
            Some(Ok(reason)) => {
                info!(reason = ?reason, "Client closed the stdio session");
                Ok(())
            }
            Some(Err(e)) => Err(DbError::internal(format!("Stdio transport error: {e}"))),
            None => {
                // The blocking stdin reader cannot be cancelled, so leave directly.
                warn!("Shutdown signal received, exiting");
                std::process::exit(0);
            }
        }
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
