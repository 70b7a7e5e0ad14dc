//! Pre-built test fixtures for common test scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;

use recast_catalog::{CatalogClient, Column, InMemoryCatalog, Partition, StorageDescriptor, Table, TableModel};
use recast_core::StorageFormat;
use recast_query::{InMemoryQueryService, QueryClient, QueryDestination};

use crate::services::CtasSimulator;
use crate::storage::TracingMemoryBackend;

/// Root URI of fixture source tables.
pub const SOURCE_ROOT: &str = "s3://lake/raw/";

/// Root URI of converted tables.
pub const TARGET_ROOT: &str = "s3://lake/curated/";

/// Query output location used by fixtures.
pub const RESULTS_ROOT: &str = "s3://lake/query-results/";

/// An in-memory data lake: catalog, object store and a query engine that
/// materializes CTAS statements into both.
pub struct TestLake {
    /// Catalog service.
    pub catalog: Arc<InMemoryCatalog>,
    /// Object store shared by every client.
    pub storage: TracingMemoryBackend,
    /// Query service driven by [`TestLake::simulator`].
    pub queries: Arc<InMemoryQueryService>,
    /// CTAS engine behind [`TestLake::queries`].
    pub simulator: CtasSimulator,
}

impl TestLake {
    /// Creates an empty lake with a `raw` source database.
    pub fn new() -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let storage = TracingMemoryBackend::new();
        let simulator = CtasSimulator::new(catalog.clone(), storage.inner());
        let queries = Arc::new(simulator.query_service());
        catalog.insert_database("raw").expect("insert database");
        Self {
            catalog,
            storage,
            queries,
            simulator,
        }
    }

    /// Catalog client over the lake's catalog and store.
    pub fn catalog_client(&self) -> CatalogClient {
        CatalogClient::new(self.catalog.clone(), Arc::new(self.storage.clone()))
    }

    /// Query client over the lake's query service and store.
    pub fn query_client(&self) -> QueryClient {
        QueryClient::new(self.queries.clone(), Arc::new(self.storage.clone()))
    }

    /// Query destination writing under [`RESULTS_ROOT`].
    pub fn destination(&self) -> QueryDestination {
        QueryDestination::location(RESULTS_ROOT)
    }

    /// Seeds a CSV table in `raw` with one data file, or one file per
    /// partition value when `partitions` is non-empty.
    ///
    /// `partition_keys` name columns of `columns` to use as keys.
    pub fn seed_table(
        &self,
        name: &str,
        columns: &[(&str, &str)],
        partition_keys: &[&str],
        partitions: &[&[&str]],
    ) -> Table {
        let location = format!("{SOURCE_ROOT}{name}/");
        let keys: Vec<String> = partition_keys.iter().map(|k| (*k).to_string()).collect();
        let table = TableModel::new("raw", name, &columns_of(columns), StorageFormat::Csv, &location, &keys).to_table();
        self.catalog.insert_table(table.clone()).expect("insert table");

        if partitions.is_empty() {
            self.storage.put(format!("{location}part-00000.csv"), "id,name\n1,a\n");
            return table;
        }
        for values in partitions {
            let suffix: Vec<String> = keys
                .iter()
                .zip(values.iter())
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            let partition_location = format!("{location}{}/", suffix.join("/"));
            self.storage
                .put(format!("{partition_location}part-00000.csv"), "id,name\n1,a\n");
            self.catalog
                .insert_partition(
                    "raw",
                    name,
                    Partition {
                        values: values.iter().map(|v| (*v).to_string()).collect(),
                        storage: StorageDescriptor::for_format(
                            StorageFormat::Csv,
                            table.columns().to_vec(),
                            partition_location,
                        ),
                        parameters: BTreeMap::new(),
                    },
                )
                .expect("insert partition");
        }
        table
    }
}

impl Default for TestLake {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds columns from `(name, type)` pairs.
pub fn columns_of(specs: &[(&str, &str)]) -> Vec<Column> {
    specs.iter().map(|(n, t)| Column::new(*n, *t)).collect()
}

/// Builds a CSV table definition at `location`.
pub fn csv_table(
    database: &str,
    name: &str,
    columns: &[(&str, &str)],
    partition_keys: &[&str],
    location: &str,
) -> Table {
    let keys: Vec<String> = partition_keys.iter().map(|k| (*k).to_string()).collect();
    TableModel::new(database, name, &columns_of(columns), StorageFormat::Csv, location, &keys).to_table()
}
