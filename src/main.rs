//! MongoDB MCP Server - Main entry point.
//!
//! This server provides MCP (Model Context Protocol) tools for AI assistants
//! to query and manage MongoDB deployments.

use mongo_mcp_server::atlas::{AccessListApi, AtlasClient};
use mongo_mcp_server::config::{APP_NAME, Config, LoggerKind, TransportMode};
use mongo_mcp_server::db::{ConnectionManager, MongoConnector};
use mongo_mcp_server::logging::{
    CompositeLogger, ConsoleSink, DiskSink, LogId, LogSink, McpSink, Redactor,
};
use mongo_mcp_server::mcp::MongoService;
use mongo_mcp_server::tools::ToolExecutor;
use mongo_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Diagnostics go to stderr so stdout
/// stays reserved for the stdio protocol stream.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

/// Build the application log sinks in the configured order.
fn build_sinks(config: &Config, redactor: &Redactor) -> (Vec<Arc<dyn LogSink>>, Option<Arc<McpSink>>) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();
    let mut mcp_sink = None;

    for kind in &config.loggers {
        match kind {
            LoggerKind::Disk => sinks.push(Arc::new(DiskSink::new(
                config.log_directory(),
                config.retention(),
                redactor.clone(),
                session_id.clone(),
            ))),
            LoggerKind::Stderr => sinks.push(Arc::new(ConsoleSink::new(redactor.clone()))),
            LoggerKind::Mcp => {
                let sink = Arc::new(McpSink::new(redactor.clone()));
                mcp_sink = Some(sink.clone());
                sinks.push(sink);
            }
        }
    }
    (sinks, mcp_sink)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);
    config.validate()?;

    info!(
        transport = %config.transport,
        "Starting MongoDB MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::debug!(config = ?config, "Effective configuration");

    let redactor = Redactor::new(config.secrets());
    let (sinks, mcp_sink) = build_sinks(&config, &redactor);
    let logger = Arc::new(CompositeLogger::new(sinks)?);

    let connector = Arc::new(MongoConnector::new(
        APP_NAME,
        config.connect_timeout_duration(),
    ));
    let connections = Arc::new(ConnectionManager::new(
        connector,
        config.connection_string.clone(),
        logger.clone(),
    ));
    let executor = Arc::new(ToolExecutor::new(
        connections,
        logger.clone(),
        config.executor_settings(),
    ));

    let mut service = MongoService::new(executor, &config.tool_filter());
    if let Some(sink) = mcp_sink {
        service = service.with_mcp_sink(sink);
    }
    if let Some(credentials) = config.atlas_credentials() {
        let client: Arc<dyn AccessListApi> =
            Arc::new(AtlasClient::new(&config.atlas_api_base_url, credentials)?);
        service = service.with_atlas(client);
    }

    logger
        .info(
            LogId::SERVER_STARTED,
            "server",
            format!(
                "Server started with {} transport and {} tools",
                config.transport,
                service.tool_names().len()
            ),
        )
        .await;

    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            StdioTransport::new(service).run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                service,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
