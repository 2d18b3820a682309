//! MongoDB Atlas integration.
//!
//! Only the project access list is managed; it is reached through the
//! [`AccessListApi`] port so the idempotent helper can be tested offline.

pub mod access_list;
pub mod client;

pub use access_list::{
    AccessListApi, AccessListEntry, AccessListOutcome, CreateAccessListInput,
    ensure_access_list_entries, entries_from_input,
};
pub use client::{AtlasClient, AtlasCredentials, DEFAULT_ATLAS_BASE_URL};
