//! Table and database conversion.
//!
//! One table converts in four sequential steps:
//!
//! 1. A CTAS query writes the source rows in the target format into a
//!    temporary table `ctas_<table>` under `<target_uri>/ctas/ctas_<table>/`.
//! 2. The waiter polls the query to a terminal state. Its output object is
//!    deleted whatever the outcome.
//! 3. The temporary table's schema, files and partitions are copied into
//!    `<target_db>.<table>` at `<target_uri>/<table>/`.
//! 4. The temporary table's metadata is deleted. Its files stay; they are the
//!    copy source and are never read again.
//!
//! Step 4 runs even when an earlier step failed.
//!
//! A database converts by running the table pipeline for every source table
//! on spawned tasks, at most `max_concurrent` at a time. Every table runs to
//! completion; failures are collected per table and aggregated once all
//! tables are done.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::Instrument;

use recast_catalog::{CatalogClient, CopyTableRequest};
use recast_core::observability::conversion_span;
use recast_core::uri::join;
use recast_core::StorageFormat;
use recast_query::{scan_cost, QueryClient, QueryDestination};

use crate::batch::{BatchReport, DatabaseSummary, FailurePolicy, TableOutcome};
use crate::config::{ConvertConfig, TableConfig, DEFAULT_MAX_CONCURRENT};
use crate::ctas::{temp_table_name, CtasStatement};
use crate::error::{ConvertError, Result};
use crate::metrics::record_table_conversion;

/// Settings shared by every table of a conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    /// Target storage format.
    pub format: StorageFormat,
    /// Root URI under which converted tables are written.
    pub target_uri: String,
    /// Where conversion query output goes.
    pub destination: QueryDestination,
    /// Bound on concurrently converted tables.
    pub max_concurrent: usize,
    /// Which failure a database conversion surfaces.
    pub failure_policy: FailurePolicy,
}

impl ConvertOptions {
    /// Creates options with the default concurrency and failure policy.
    #[must_use]
    pub fn new(format: StorageFormat, target_uri: impl Into<String>, destination: QueryDestination) -> Self {
        Self {
            format,
            target_uri: target_uri.into(),
            destination,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Creates options from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &ConvertConfig, format: StorageFormat, target_uri: impl Into<String>) -> Self {
        Self::new(format, target_uri, config.destination()).with_max_concurrent(config.max_concurrent)
    }

    /// Sets the concurrency bound. Zero is treated as one.
    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

/// One table to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConversion {
    /// Database holding the source table.
    pub source_database: String,
    /// Database receiving the converted table.
    pub target_database: String,
    /// Table name, shared by source and target.
    pub table: String,
    /// Requested partition columns. Columns missing from the source are
    /// dropped.
    pub partition_columns: Option<Vec<String>>,
    /// Bucket columns.
    pub bucket_columns: Vec<String>,
    /// Bucket count, required with bucket columns.
    pub bucket_count: Option<u32>,
}

impl TableConversion {
    /// Creates an unpartitioned conversion.
    #[must_use]
    pub fn new(
        source_database: impl Into<String>,
        target_database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            source_database: source_database.into(),
            target_database: target_database.into(),
            table: table.into(),
            partition_columns: None,
            bucket_columns: Vec::new(),
            bucket_count: None,
        }
    }

    /// Sets the requested partition columns.
    #[must_use]
    pub fn with_partition_columns(mut self, columns: Option<Vec<String>>) -> Self {
        self.partition_columns = columns;
        self
    }

    /// Sets bucketing.
    #[must_use]
    pub fn with_bucketing(mut self, columns: Vec<String>, count: Option<u32>) -> Self {
        self.bucket_columns = columns;
        self.bucket_count = count;
        self
    }

    /// Applies per-table settings.
    #[must_use]
    pub fn with_config(self, config: TableConfig) -> Self {
        self.with_partition_columns(config.partition_by)
            .with_bucketing(config.bucket_by, config.bucket_count)
    }
}

/// A whole database to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConversion {
    /// Database whose tables are converted.
    pub source_database: String,
    /// Database receiving the converted tables.
    pub target_database: String,
    /// Per-table settings by table name.
    pub tables: BTreeMap<String, TableConfig>,
    /// Partition columns for tables without their own.
    pub default_partition_by: Option<Vec<String>>,
}

impl DatabaseConversion {
    /// Creates a conversion with no per-table settings.
    #[must_use]
    pub fn new(source_database: impl Into<String>, target_database: impl Into<String>) -> Self {
        Self {
            source_database: source_database.into(),
            target_database: target_database.into(),
            ..Self::default()
        }
    }

    /// Takes per-table settings and default partitioning from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &ConvertConfig) -> Self {
        self.tables.clone_from(&config.tables);
        self.default_partition_by.clone_from(&config.default_partition_by);
        self
    }

    /// The conversion of one table. Explicit table settings win over the
    /// database default.
    #[must_use]
    pub fn table(&self, table: &str) -> TableConversion {
        let mut config = self.tables.get(table).cloned().unwrap_or_default();
        if config.partition_by.is_none() {
            config.partition_by.clone_from(&self.default_partition_by);
        }
        TableConversion::new(&self.source_database, &self.target_database, table).with_config(config)
    }
}

/// Runs table and database conversions.
#[derive(Clone)]
pub struct Converter {
    catalog: CatalogClient,
    query: QueryClient,
    options: Arc<ConvertOptions>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// Creates a converter. Queries wait with the options `query` carries.
    #[must_use]
    pub fn new(catalog: CatalogClient, query: QueryClient, options: ConvertOptions) -> Self {
        Self {
            catalog,
            query,
            options: Arc::new(options),
        }
    }

    /// The options every conversion uses.
    #[must_use]
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Converts one table and returns the bytes its query scanned (0 if the
    /// service did not report it).
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid bucketing,
    /// [`recast_query::QueryError::QueryFailed`] (wrapped) if the CTAS query
    /// did not succeed, or any catalog and storage error.
    pub async fn convert_table(&self, conversion: &TableConversion) -> Result<u64> {
        let span = conversion_span("convert_table", &conversion.target_database, &conversion.table);
        let started = Instant::now();
        let result = self.convert_table_inner(conversion).instrument(span).await;
        record_table_conversion(
            result.is_ok(),
            *result.as_ref().unwrap_or(&0),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn convert_table_inner(&self, conversion: &TableConversion) -> Result<u64> {
        tracing::info!(
            source = %format!("{}.{}", conversion.source_database, conversion.table),
            format = self.options.format.as_str(),
            "converting table"
        );
        let temp_table = temp_table_name(&conversion.table);

        let outcome = self.run_pipeline(conversion, &temp_table).await;

        tracing::info!(temp_table, "deleting temporary table");
        let cleanup = self
            .catalog
            .delete_table(&conversion.target_database, &temp_table, false)
            .await;

        match (outcome, cleanup) {
            (Ok(bytes), Ok(())) => Ok(bytes),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup_err)) => {
                tracing::warn!(temp_table, error = %cleanup_err, "failed to delete temporary table");
                Err(err)
            }
        }
    }

    async fn run_pipeline(&self, conversion: &TableConversion, temp_table: &str) -> Result<u64> {
        let format = self.options.format;
        let source_db = conversion.source_database.as_str();
        let target_db = conversion.target_database.as_str();

        let partition_columns = match &conversion.partition_columns {
            Some(requested) => {
                self.catalog
                    .resolve_partition_columns(source_db, &conversion.table, requested)
                    .await?
            }
            None => Vec::new(),
        };
        let source_columns: Vec<String> = if partition_columns.is_empty() {
            Vec::new()
        } else {
            self.catalog
                .get_columns(source_db, &conversion.table)
                .await?
                .into_iter()
                .map(|c| c.name)
                .collect()
        };

        let temp_location = join(&self.options.target_uri, &["ctas", temp_table]);
        let target_location = join(&self.options.target_uri, &[conversion.table.as_str()]);

        let sql = CtasStatement::new(source_db, &conversion.table, target_db, temp_table, temp_location, format)
            .partitioned_by(partition_columns.clone())
            .bucketed_by(conversion.bucket_columns.clone(), conversion.bucket_count)
            .build(&source_columns)?;

        let execution = self
            .query
            .run(target_db, &sql, &self.options.destination, true)
            .await?;

        let request = CopyTableRequest::new(target_db, target_db, temp_table, &conversion.table, &target_location, format)
            .with_partition_columns(partition_columns);
        let changed = self.catalog.copy_table(&request).await?;

        let bytes_scanned = execution.bytes_scanned();
        tracing::info!(
            changed,
            location = %target_location,
            bytes_scanned,
            cost = scan_cost(bytes_scanned),
            "converted table"
        );
        Ok(bytes_scanned)
    }

    /// Converts every table of a database and reports each table's outcome.
    ///
    /// The target database is created if missing. A failing table never
    /// stops the others. An empty source database yields an empty report.
    ///
    /// # Errors
    ///
    /// Returns an error only if the target database cannot be created or the
    /// source tables cannot be listed. Table failures are in the report.
    pub async fn convert_database_report(&self, conversion: &DatabaseConversion) -> Result<BatchReport> {
        let span = conversion_span("convert_database", &conversion.target_database, "*");
        self.convert_database_inner(conversion).instrument(span).await
    }

    async fn convert_database_inner(&self, conversion: &DatabaseConversion) -> Result<BatchReport> {
        tracing::info!(
            source = %conversion.source_database,
            format = self.options.format.as_str(),
            target_uri = %self.options.target_uri,
            "converting database"
        );

        if self.catalog.create_database(&conversion.target_database).await? {
            tracing::info!("created target database");
        }

        let tables = self.catalog.list_tables(&conversion.source_database).await?;
        let mut report = BatchReport::new(&conversion.target_database);
        if tables.is_empty() {
            tracing::info!("source database has no tables");
            return Ok(report);
        }

        let workers = self.options.max_concurrent.min(tables.len()).max(1);
        let slots = Arc::new(Semaphore::new(workers));
        let mut running = FuturesUnordered::new();

        for table in tables {
            let job = conversion.table(&table);
            let converter = self.clone();
            let slots = Arc::clone(&slots);
            let handle = tokio::spawn(async move {
                match slots.acquire_owned().await {
                    Ok(_permit) => converter.convert_table(&job).await,
                    Err(e) => Err(ConvertError::Core(recast_core::Error::Internal {
                        message: format!("conversion slots closed: {e}"),
                    })),
                }
            });
            running.push(async move { (table, handle.await) });
        }

        while let Some((table, joined)) = running.next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(ConvertError::TaskPanicked {
                    table: table.clone(),
                    message: e.to_string(),
                })
            });
            match &result {
                Ok(bytes_scanned) => tracing::info!(table, bytes_scanned, "table converted"),
                Err(err) => tracing::error!(table, error = %err, "failed to convert table"),
            }
            report.push(TableOutcome { table, result });
        }

        let bytes_scanned = report.bytes_scanned();
        tracing::info!(
            tables_converted = report.tables_converted(),
            failed = report.failed_tables().len(),
            bytes_scanned,
            cost = scan_cost(bytes_scanned),
            "converted database"
        );
        Ok(report)
    }

    /// Converts every table of a database and applies the failure policy.
    ///
    /// # Errors
    ///
    /// Returns the failure the policy selects once every table has finished,
    /// or any error [`convert_database_report`](Self::convert_database_report)
    /// returns.
    pub async fn convert_database(&self, conversion: &DatabaseConversion) -> Result<DatabaseSummary> {
        self.convert_database_report(conversion)
            .await?
            .into_result(self.options.failure_policy)
    }
}
