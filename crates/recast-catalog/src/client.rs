//! Catalog client used by the conversion pipeline.
//!
//! [`CatalogClient`] layers the table-level operations of the pipeline on top
//! of a [`CatalogService`] and a [`StorageBackend`]:
//!
//! - lookups that turn "not found" into `None` where absence is expected
//! - idempotent database creation
//! - schema-merging table creation (see [`crate::merge`])
//! - cascading table deletion, partitions first
//! - table copies, optionally moving data files and partition metadata
//!
//! Both dependencies are injected, so the client runs unchanged against the
//! in-memory implementations in tests.

use std::sync::Arc;

use tracing::Instrument;

use recast_core::observability::catalog_span;
use recast_core::{StorageBackend, StorageFormat};

use crate::error::{CatalogError, Result};
use crate::merge::{reconcile, MergePolicy, Reconciliation, TableModel};
use crate::partition_sync::PartitionSynchronizer;
use crate::service::CatalogService;
use crate::types::{strip_comments, Column, Database, Partition, Table};

/// Request to copy one table definition (and optionally its data) to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTableRequest {
    /// Database of the source table.
    pub source_database: String,
    /// Database of the target table.
    pub target_database: String,
    /// Source table name.
    pub source_table: String,
    /// Target table name.
    pub target_table: String,
    /// Storage location of the target table.
    pub target_location: String,
    /// Storage format of the target table.
    pub format: StorageFormat,
    /// Columns to use as partition keys of the target table.
    pub partition_columns: Vec<String>,
    /// Copy partition metadata after creating the table.
    pub copy_partitions: bool,
    /// Copy data files from the source location to the target location.
    pub copy_files: bool,
}

impl CopyTableRequest {
    /// Creates a request that copies partitions and files.
    #[must_use]
    pub fn new(
        source_database: impl Into<String>,
        target_database: impl Into<String>,
        source_table: impl Into<String>,
        target_table: impl Into<String>,
        target_location: impl Into<String>,
        format: StorageFormat,
    ) -> Self {
        Self {
            source_database: source_database.into(),
            target_database: target_database.into(),
            source_table: source_table.into(),
            target_table: target_table.into(),
            target_location: target_location.into(),
            format,
            partition_columns: Vec::new(),
            copy_partitions: true,
            copy_files: true,
        }
    }

    /// Sets the partition columns of the target table.
    #[must_use]
    pub fn with_partition_columns(mut self, partition_columns: Vec<String>) -> Self {
        self.partition_columns = partition_columns;
        self
    }

    /// Enables or disables partition metadata copying.
    #[must_use]
    pub const fn copy_partitions(mut self, enabled: bool) -> Self {
        self.copy_partitions = enabled;
        self
    }

    /// Enables or disables data file copying.
    #[must_use]
    pub const fn copy_files(mut self, enabled: bool) -> Self {
        self.copy_files = enabled;
        self
    }
}

/// Table and partition operations over a catalog service and object storage.
#[derive(Clone)]
pub struct CatalogClient {
    service: Arc<dyn CatalogService>,
    storage: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient").finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Creates a client over the given service and storage backend.
    #[must_use]
    pub fn new(service: Arc<dyn CatalogService>, storage: Arc<dyn StorageBackend>) -> Self {
        Self { service, storage }
    }

    /// The underlying catalog service.
    #[must_use]
    pub fn service(&self) -> &Arc<dyn CatalogService> {
        &self.service
    }

    /// The underlying storage backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Fetches a database, returning `None` if it does not exist.
    pub async fn get_database(&self, name: &str) -> Result<Option<Database>> {
        absent_if_not_found(self.service.get_database(name).await)
    }

    /// Fetches a table, returning `None` if it does not exist.
    pub async fn get_table(&self, database: &str, table: &str) -> Result<Option<Table>> {
        absent_if_not_found(self.service.get_table(database, table).await)
    }

    /// Creates a database if it does not exist.
    ///
    /// Returns true if this call created it. A concurrent creator winning the
    /// race is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn create_database(&self, name: &str) -> Result<bool> {
        if self.get_database(name).await?.is_some() {
            return Ok(false);
        }

        let created = match self.service.create_database(Database::new(name)).await {
            Ok(()) => true,
            Err(err) if err.is_already_exists() => false,
            Err(err) => return Err(err),
        };

        if self.get_database(name).await?.is_none() {
            return Err(CatalogError::service(format!("failed to create database {name}")));
        }
        if created {
            tracing::info!(database = name, "created database");
        }
        Ok(created)
    }

    /// Lists the names of every table in a database.
    pub async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.service.get_tables(database, token.as_deref()).await?;
            names.extend(page.items.into_iter().map(|t| t.name));
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(names),
            }
        }
    }

    /// Returns data columns followed by partition keys, comments stripped.
    ///
    /// Empty when the table does not exist.
    pub async fn get_columns(&self, database: &str, table: &str) -> Result<Vec<Column>> {
        let Some(table) = self.get_table(database, table).await? else {
            return Ok(Vec::new());
        };
        let mut columns = strip_comments(table.columns());
        columns.extend(strip_comments(&table.partition_keys));
        Ok(columns)
    }

    /// Returns the partition keys of a table, comments stripped.
    pub async fn get_partition_keys(&self, database: &str, table: &str) -> Result<Vec<Column>> {
        let table = self.require_table(database, table).await?;
        Ok(strip_comments(&table.partition_keys))
    }

    /// Returns the storage location of a table.
    pub async fn get_location(&self, database: &str, table: &str) -> Result<String> {
        let table = self.require_table(database, table).await?;
        table
            .location()
            .map(str::to_string)
            .ok_or_else(|| CatalogError::MissingLocation {
                database: database.to_string(),
                table: table.name.clone(),
            })
    }

    /// Keeps the requested partition columns that exist in the table, in
    /// request order.
    pub async fn resolve_partition_columns(
        &self,
        database: &str,
        table: &str,
        requested: &[String],
    ) -> Result<Vec<String>> {
        let columns = self.get_columns(database, table).await?;
        Ok(requested
            .iter()
            .filter(|name| columns.iter().any(|c| &c.name == *name))
            .cloned()
            .collect())
    }

    /// Lists every partition of a table.
    pub async fn list_partitions(&self, database: &str, table: &str) -> Result<Vec<Partition>> {
        let mut partitions = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .service
                .get_partitions(database, table, token.as_deref())
                .await?;
            partitions.extend(page.items);
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(partitions),
            }
        }
    }

    /// Lists the value tuples of every partition of a table.
    pub async fn list_partition_values(&self, database: &str, table: &str) -> Result<Vec<Vec<String>>> {
        Ok(self
            .list_partitions(database, table)
            .await?
            .into_iter()
            .map(|p| p.values)
            .collect())
    }

    /// Creates or reconciles a table with the candidate definition.
    ///
    /// Returns true if a catalog write happened. A candidate with no columns
    /// writes nothing.
    #[tracing::instrument(skip(self, model), fields(database = %model.database, table = %model.name))]
    pub async fn create_table(&self, model: TableModel, policy: MergePolicy) -> Result<bool> {
        if model.columns.is_empty() && model.partition_keys.is_empty() {
            return Ok(false);
        }

        let existing = self.get_table(&model.database, &model.name).await?;
        match reconcile(model, existing.as_ref(), policy) {
            Reconciliation::Create(table) => {
                tracing::info!(table = %table.qualified_name(), "creating table");
                self.service.create_table(table).await?;
                Ok(true)
            }
            Reconciliation::Update(table) => {
                tracing::info!(table = %table.qualified_name(), ?policy, "updating table");
                self.service.update_table(table).await?;
                Ok(true)
            }
            Reconciliation::Unchanged => Ok(false),
        }
    }

    /// Deletes every partition of a table, optionally with their files.
    ///
    /// Returns the number of partitions deleted.
    pub async fn delete_all_partitions(
        &self,
        database: &str,
        table: &str,
        delete_files: bool,
    ) -> Result<usize> {
        let partitions = self.list_partitions(database, table).await?;
        if partitions.is_empty() {
            return Ok(0);
        }

        if delete_files {
            let locations: Vec<String> = partitions
                .iter()
                .filter_map(|p| p.location().map(str::to_string))
                .collect();
            self.storage.delete_prefixes(&locations).await?;
        }

        let values: Vec<Vec<String>> = partitions.into_iter().map(|p| p.values).collect();
        let count = values.len();
        self.service
            .batch_delete_partitions(database, table, values)
            .await?;
        Ok(count)
    }

    /// Deletes a table, its partitions and optionally its files.
    ///
    /// Partitions go first so none are left orphaned. Missing tables are
    /// ignored.
    pub async fn delete_table(&self, database: &str, table: &str, delete_files: bool) -> Result<()> {
        self.delete_table_inner(database, table, delete_files)
            .instrument(catalog_span("delete_table", database, table))
            .await
    }

    async fn delete_table_inner(&self, database: &str, table: &str, delete_files: bool) -> Result<()> {
        let Some(definition) = self.get_table(database, table).await? else {
            return Ok(());
        };

        let partitions = self.delete_all_partitions(database, table, delete_files).await?;

        if delete_files {
            if let Some(location) = definition.location() {
                self.storage.delete_prefix(location).await?;
            }
        }

        self.service.delete_table(database, table).await?;
        tracing::info!(partitions, delete_files, "deleted table");
        Ok(())
    }

    /// Copies the definition of one table onto another.
    ///
    /// The source columns are merged into the target (created if missing).
    /// Data files and partition metadata follow when the request asks for
    /// them. Returns whether the target table definition changed.
    pub async fn copy_table(&self, request: &CopyTableRequest) -> Result<bool> {
        let span = catalog_span("copy_table", &request.target_database, &request.target_table);
        self.copy_table_inner(request).instrument(span).await
    }

    async fn copy_table_inner(&self, request: &CopyTableRequest) -> Result<bool> {
        tracing::info!(
            source = %format!("{}.{}", request.source_database, request.source_table),
            "copying table"
        );

        let columns = self
            .get_columns(&request.source_database, &request.source_table)
            .await?;
        let model = TableModel::new(
            &request.target_database,
            &request.target_table,
            &columns,
            request.format,
            &request.target_location,
            &request.partition_columns,
        );
        let changed = self.create_table(model, MergePolicy::Merge).await?;

        let mut files = 0;
        if request.copy_files {
            let source_location = self
                .get_location(&request.source_database, &request.source_table)
                .await?;
            files = self
                .storage
                .copy_prefix(&source_location, &request.target_location)
                .await?;
        }

        let mut partitions = 0;
        if request.copy_partitions {
            partitions = PartitionSynchronizer::new(self.clone())
                .sync(
                    &request.source_database,
                    &request.target_database,
                    &request.source_table,
                    &request.target_table,
                )
                .await?;
        }

        tracing::info!(changed, partitions, files, "copied table");
        Ok(changed)
    }

    async fn require_table(&self, database: &str, table: &str) -> Result<Table> {
        self.get_table(database, table)
            .await?
            .ok_or_else(|| CatalogError::not_found("table", format!("{database}.{table}")))
    }
}

fn absent_if_not_found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
