//! The remote catalog service boundary.
//!
//! [`CatalogService`] mirrors the metadata service API one call per method.
//! Implementations must distinguish a missing entity
//! ([`CatalogError::EntityNotFound`](crate::CatalogError::EntityNotFound)) and
//! an existing one ([`CatalogError::AlreadyExists`](crate::CatalogError::AlreadyExists))
//! from other failures, because the client's idempotent paths depend on it.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Database, Partition, Table};

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Token for the next page, `None` on the last page.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// Creates a final page.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// Remote metadata catalog API.
#[async_trait]
pub trait CatalogService: Send + Sync + 'static {
    /// Fetches a database.
    async fn get_database(&self, name: &str) -> Result<Database>;

    /// Creates a database. Fails with `AlreadyExists` if present.
    async fn create_database(&self, database: Database) -> Result<()>;

    /// Fetches a table.
    async fn get_table(&self, database: &str, name: &str) -> Result<Table>;

    /// Creates a table. Fails with `AlreadyExists` if present.
    async fn create_table(&self, table: Table) -> Result<()>;

    /// Replaces an existing table definition.
    async fn update_table(&self, table: Table) -> Result<()>;

    /// Deletes a table.
    async fn delete_table(&self, database: &str, name: &str) -> Result<()>;

    /// Lists one page of tables in a database.
    async fn get_tables(&self, database: &str, page_token: Option<&str>) -> Result<Page<Table>>;

    /// Lists one page of partitions of a table.
    async fn get_partitions(
        &self,
        database: &str,
        table: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Partition>>;

    /// Creates one partition.
    async fn create_partition(&self, database: &str, table: &str, partition: Partition) -> Result<()>;

    /// Creates many partitions in one call.
    async fn batch_create_partitions(
        &self,
        database: &str,
        table: &str,
        partitions: Vec<Partition>,
    ) -> Result<()>;

    /// Deletes the partitions identified by `values`.
    async fn batch_delete_partitions(
        &self,
        database: &str,
        table: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()>;
}
