//! Tool descriptors and the filters that decide which tools are exposed.
//!
//! Names and descriptions are what the MCP router advertises; the category
//! recorded here drives read-only mode and `--disabled-tools`.

use crate::tools::pipeline::{OperationCategory, OperationKind};

pub const CONNECT_TOOL: &str = "connect";
pub const ATLAS_ACCESS_LIST_TOOL: &str = "atlas_create_access_list";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub category: OperationCategory,
    /// Atlas tools need API credentials.
    pub requires_atlas: bool,
}

/// Every tool the server knows about.
pub fn catalog() -> Vec<ToolDescriptor> {
    let mut tools: Vec<ToolDescriptor> = OperationKind::ALL
        .iter()
        .map(|kind| ToolDescriptor {
            name: kind.name(),
            category: kind.category(),
            requires_atlas: false,
        })
        .collect();
    tools.push(ToolDescriptor {
        name: CONNECT_TOOL,
        category: OperationCategory::Metadata,
        requires_atlas: false,
    });
    tools.push(ToolDescriptor {
        name: ATLAS_ACCESS_LIST_TOOL,
        category: OperationCategory::Create,
        requires_atlas: true,
    });
    tools
}

/// What to hide from clients.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    pub read_only: bool,
    /// Tool names or category names.
    pub disabled: Vec<String>,
    pub atlas_enabled: bool,
}

impl ToolFilter {
    pub fn allows(&self, tool: &ToolDescriptor) -> bool {
        if self.read_only && tool.category.is_mutating() {
            return false;
        }
        if tool.requires_atlas && !self.atlas_enabled {
            return false;
        }
        !self.disabled.iter().any(|entry| {
            let entry = entry.trim();
            entry.eq_ignore_ascii_case(tool.name)
                || entry.eq_ignore_ascii_case(tool.category.as_str())
        })
    }

    /// Names of the tools that must be removed from the router.
    pub fn removed_tools(&self) -> Vec<&'static str> {
        catalog()
            .into_iter()
            .filter(|tool| !self.allows(tool))
            .map(|tool| tool.name)
            .collect()
    }
}
