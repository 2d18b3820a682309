//! Project IP access list management.

use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ACCESS_LIST_COMMENT: &str = "Added by MongoDB MCP Server";

/// One access list entry as the Atlas Admin API expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl AccessListEntry {
    pub fn ip(address: impl Into<String>, comment: &str) -> Self {
        Self {
            ip_address: Some(address.into()),
            cidr_block: None,
            comment: Some(comment.to_string()),
        }
    }

    pub fn cidr(block: impl Into<String>, comment: &str) -> Self {
        Self {
            ip_address: None,
            cidr_block: Some(block.into()),
            comment: Some(comment.to_string()),
        }
    }
}

/// Result of an "ensure present" call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessListOutcome {
    Created,
    AlreadyPresent,
}

/// The remote operations the access list helper needs.
#[async_trait]
pub trait AccessListApi: Send + Sync {
    /// Create entries. A duplicate must surface as `DbError::Api { status: 409, .. }`.
    async fn create_entries(&self, project_id: &str, entries: &[AccessListEntry]) -> DbResult<()>;

    /// Public IP address of this machine as seen by Atlas.
    async fn current_ip(&self) -> DbResult<String>;
}

/// Add `entries` to the project's access list. A conflict means the entries
/// are already there and is not an error.
pub async fn ensure_access_list_entries(
    api: &dyn AccessListApi,
    project_id: &str,
    entries: &[AccessListEntry],
) -> DbResult<AccessListOutcome> {
    if !is_project_id(project_id) {
        return Err(DbError::validation(format!(
            "`project_id` must be a 24-character hexadecimal Atlas project id, got {project_id:?}"
        )));
    }
    if entries.is_empty() {
        return Err(DbError::validation(
            "Provide at least one of `ip_addresses`, `cidr_blocks` or `current_ip_address`",
        ));
    }

    match api.create_entries(project_id, entries).await {
        Ok(()) => Ok(AccessListOutcome::Created),
        Err(DbError::Api { status: 409, .. }) => Ok(AccessListOutcome::AlreadyPresent),
        Err(e) => Err(e),
    }
}

/// Atlas project ids are ObjectIds.
pub fn is_project_id(value: &str) -> bool {
    value.len() == 24 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateAccessListInput {
    /// Atlas project ID
    pub project_id: String,
    /// IP addresses to allow
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    /// CIDR ranges to allow
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
    /// Also allow the public IP address of the machine running this server
    #[serde(default)]
    pub current_ip_address: bool,
    /// Comment stored with every entry
    #[serde(default)]
    pub comment: Option<String>,
}

/// Resolve the tool input into concrete entries.
pub async fn entries_from_input(
    api: &dyn AccessListApi,
    input: &CreateAccessListInput,
) -> DbResult<Vec<AccessListEntry>> {
    let comment = input
        .comment
        .as_deref()
        .unwrap_or(DEFAULT_ACCESS_LIST_COMMENT);

    let mut entries: Vec<AccessListEntry> = input
        .ip_addresses
        .iter()
        .map(|ip| AccessListEntry::ip(ip.trim(), comment))
        .chain(
            input
                .cidr_blocks
                .iter()
                .map(|block| AccessListEntry::cidr(block.trim(), comment)),
        )
        .collect();

    if input.current_ip_address {
        entries.push(AccessListEntry::ip(api.current_ip().await?, comment));
    }
    Ok(entries)
}
