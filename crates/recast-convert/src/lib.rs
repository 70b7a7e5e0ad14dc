//! # recast-convert
//!
//! Converts catalog tables to a new storage format with CTAS queries.
//!
//! - **CTAS**: [`CtasStatement`] renders the conversion query
//! - **Converter**: [`Converter`] runs the per-table pipeline and fans it out
//!   over a whole database with bounded concurrency
//! - **Batch outcomes**: [`BatchReport`] keeps every table's result and
//!   applies the [`FailurePolicy`]
//! - **Configuration**: [`ConvertConfig`] from JSON and `RECAST_*` variables
//! - **Metrics**: conversion counters through the `metrics` facade
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use recast_catalog::{CatalogClient, InMemoryCatalog};
//! use recast_convert::prelude::*;
//! use recast_core::{MemoryBackend, StorageFormat};
//! use recast_query::{InMemoryQueryService, QueryClient, QueryDestination};
//!
//! # async fn example() -> recast_convert::Result<()> {
//! let storage = Arc::new(MemoryBackend::new());
//! let catalog = CatalogClient::new(Arc::new(InMemoryCatalog::new()), storage.clone());
//! let query = QueryClient::new(Arc::new(InMemoryQueryService::new()), storage);
//! let options = ConvertOptions::new(
//!     StorageFormat::Parquet,
//!     "s3://lake/curated/",
//!     QueryDestination::workgroup("etl"),
//! );
//!
//! let summary = Converter::new(catalog, query, options)
//!     .convert_database(&DatabaseConversion::new("raw", "curated"))
//!     .await?;
//! println!("converted {} tables", summary.tables_converted);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod batch;
pub mod config;
pub mod converter;
pub mod ctas;
pub mod error;
pub mod metrics;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::batch::{BatchReport, DatabaseSummary, FailurePolicy};
    pub use crate::config::{ConvertConfig, TableConfig};
    pub use crate::converter::{ConvertOptions, Converter, DatabaseConversion, TableConversion};
    pub use crate::error::{ConvertError, Result};
}

pub use batch::{BatchReport, DatabaseSummary, FailurePolicy, TableOutcome};
pub use config::{ConvertConfig, TableConfig};
pub use converter::{ConvertOptions, Converter, DatabaseConversion, TableConversion};
pub use ctas::{temp_table_name, CtasStatement};
pub use error::{ConvertError, Result};
