//! MongoDB MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to query and manage MongoDB deployments, plus an optional Atlas
//! access-list tool.

pub mod atlas;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::MongoService;
