//! Error types for the MongoDB MCP Server.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each error variant provides actionable messages to help AI assistants understand
//! and recover from error conditions.

use crate::db::DriverError;
use thiserror::Error;

/// Suggestion attached to every connection error.
pub const CONNECT_SUGGESTION: &str = "Call the `connect` tool with a MongoDB connection string, \
     or start the server with --connection-string / MDB_MCP_CONNECTION_STRING";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid arguments: {message}")]
    Validation { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Error running {operation} on {namespace}: {message}")]
    Operation {
        operation: String,
        namespace: String,
        message: String,
        /// Server error code, e.g. 26 for NamespaceNotFound
        code: Option<i32>,
    },

    #[error("Index usage inspection failed: {message}")]
    Inspection { message: String },

    #[error("Permission denied: {operation} - {reason}")]
    Permission { operation: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Atlas API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Connection error used when no target has been configured yet.
    pub fn not_connected() -> Self {
        Self::connection(
            "You need to connect to a MongoDB instance before you can access its data",
            CONNECT_SUGGESTION,
        )
    }

    /// Create an operation error annotated with the operation and namespace.
    pub fn operation(
        operation: impl Into<String>,
        namespace: impl Into<String>,
        message: impl Into<String>,
        code: Option<i32>,
    ) -> Self {
        Self::Operation {
            operation: operation.into(),
            namespace: namespace.into(),
            message: message.into(),
            code,
        }
    }

    /// Wrap a driver error for the given operation and namespace.
    ///
    /// Driver-side connectivity problems stay connection errors so the caller
    /// still gets the remediation text.
    pub fn from_driver(
        operation: impl Into<String>,
        namespace: impl Into<String>,
        err: DriverError,
    ) -> Self {
        if err.is_connectivity() {
            return Self::connection(err.message, CONNECT_SUGGESTION);
        }
        Self::operation(operation, namespace, err.message, err.code)
    }

    /// Create an inspection error.
    pub fn inspection(message: impl Into<String>) -> Self {
        Self::Inspection {
            message: message.into(),
        }
    }

    /// Create a permission error.
    pub fn permission(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permission {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an Atlas API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Permission { .. } => {
                Some("The server runs in read-only mode; only read and metadata tools are available")
            }
            Self::Operation { code: Some(26), .. } => {
                Some("The namespace does not exist. Check the database and collection names")
            }
            _ => None,
        }
    }
}

/// Result type alias for tool operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            DbError::Validation { .. }
            | DbError::Permission { .. }
            | DbError::Operation { .. }
            | DbError::Configuration { .. } => rmcp::ErrorData::invalid_params(err.to_string(), data),

            DbError::Connection { .. }
            | DbError::Inspection { .. }
            | DbError::Api { .. }
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}
