//! MCP tool implementations.
//!
//! - `pipeline`: shared execution path (validate, connect, index check, execute)
//! - `index_check`: winning-plan inspection for collection scans
//! - `format`: JSON ↔ BSON conversion and canonical extended JSON output
//! - `read`: `find`, `aggregate`, `count`, `collection_schema`
//! - `write`: inserts, updates, index and collection creation, renames
//! - `delete`: `delete_many` and the drop tools
//! - `metadata`: databases, collections, indexes, statistics, server logs
//! - `explain`: explain dispatcher over aggregate/find/count
//! - `catalog`: tool categories and read-only / disabled-tool filtering

pub mod catalog;
pub mod delete;
pub mod explain;
pub mod format;
pub mod index_check;
pub mod metadata;
pub mod pipeline;
pub mod read;
pub mod write;

pub use catalog::{ToolDescriptor, ToolFilter, catalog};
pub use index_check::{IndexUsageInspector, IndexUsageVerdict, analyze_explain};
pub use pipeline::{
    DbOperation, ExecutorSettings, OperationCategory, OperationKind, ToolExecutor, ToolOutput,
};
