//! Database access layer.
//!
//! - `driver`: the narrow command interface the tools are written against
//! - `mongo`: implementation backed by the official MongoDB driver
//! - `connection`: lazily established, single-flight connection management
//! - `reply`: helpers for reading command replies and draining cursors

pub mod connection;
pub mod driver;
pub mod mongo;
pub mod reply;

pub use connection::{ConnectionManager, ConnectionStatus};
pub use driver::{Connector, Driver, DriverError, DriverErrorKind, DriverResult, Namespace};
pub use mongo::{MongoConnector, MongoDriver};
pub use reply::{check_write_errors, drain_cursor, get_number};
