//! # recast-catalog
//!
//! Metadata catalog access for recast.
//!
//! - **Service boundary**: [`CatalogService`], the remote catalog API, plus an
//!   in-memory implementation for tests and dry runs
//! - **Client**: [`CatalogClient`], the table and partition operations the
//!   conversion pipeline needs, layered over the service and object storage
//! - **Schema merge**: pure reconciliation of a candidate schema with an
//!   existing table definition
//! - **Partition sync**: copying partition metadata between tables with
//!   location rewriting
//!
//! The catalog service is the only source of truth. Nothing read here is
//! cached beyond the operation that read it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod memory;
pub mod merge;
pub mod partition_sync;
pub mod service;
pub mod types;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{CatalogClient, CopyTableRequest};
    pub use crate::error::{CatalogError, Result};
    pub use crate::merge::MergePolicy;
    pub use crate::service::CatalogService;
    pub use crate::types::{Column, Database, Partition, StorageDescriptor, Table};
}

pub use client::{CatalogClient, CopyTableRequest};
pub use error::{CatalogError, Result};
pub use memory::InMemoryCatalog;
pub use merge::{MergePolicy, Reconciliation, TableModel};
pub use partition_sync::PartitionSynchronizer;
pub use service::{CatalogService, Page};
pub use types::{Column, Database, Partition, StorageDescriptor, Table};
