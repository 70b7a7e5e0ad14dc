//! A simulated query engine that materializes CTAS statements.
//!
//! [`CtasSimulator`] plugs into [`InMemoryQueryService`] as its handler. For
//! every `create table ... with (...) as select ... from ...` statement it
//! registers the new table in the in-memory catalog, copies the source
//! table's files under the statement's `external_location`, and recreates
//! the source partitions there when the partition keys line up. Anything
//! else succeeds without side effects.
//!
//! Repartitioning an unpartitioned source yields an unpartitioned data
//! layout: the simulator never reads file contents.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use recast_catalog::{Column, InMemoryCatalog, Partition, StorageDescriptor, TableModel};
use recast_core::storage::relocate;
use recast_core::{MemoryBackend, StorageFormat};
use recast_query::{InMemoryQueryService, ScriptedOutcome, StartQueryRequest};

/// Engine time reported for every simulated statement.
pub const SIMULATED_RUNTIME_MS: u64 = 1_000;

/// The parts of a CTAS statement the simulator acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCtas {
    /// Database of the created table.
    pub target_database: String,
    /// Name of the created table.
    pub target_table: String,
    /// Database of the selected table.
    pub source_database: String,
    /// Name of the selected table.
    pub source_table: String,
    /// `format` property.
    pub format: String,
    /// `external_location` property.
    pub external_location: String,
    /// `partitioned_by` property.
    pub partitioned_by: Vec<String>,
    /// `bucketed_by` property.
    pub bucketed_by: Vec<String>,
}

/// Parses the statements `recast-convert` generates. Returns `None` for any
/// other statement.
pub fn parse_ctas(sql: &str) -> Option<ParsedCtas> {
    let rest = sql.strip_prefix("create table ")?;
    let (target, rest) = rest.split_once(" with (")?;
    let (with, rest) = rest.split_once(") as select ")?;
    let (_, source) = rest.rsplit_once(" from ")?;
    let (target_database, target_table) = target.split_once('.')?;
    let (source_database, source_table) = source.trim().split_once('.')?;

    let mut parsed = ParsedCtas {
        target_database: target_database.to_string(),
        target_table: target_table.to_string(),
        source_database: source_database.to_string(),
        source_table: source_table.to_string(),
        format: String::new(),
        external_location: String::new(),
        partitioned_by: Vec::new(),
        bucketed_by: Vec::new(),
    };
    for property in split_properties(with) {
        let (key, value) = property.split_once('=')?;
        match key {
            "format" => parsed.format = unquote(value),
            "external_location" => parsed.external_location = unquote(value),
            "partitioned_by" => parsed.partitioned_by = parse_array(value),
            "bucketed_by" => parsed.bucketed_by = parse_array(value),
            _ => {}
        }
    }
    Some(parsed)
}

fn split_properties(with: &str) -> Vec<&str> {
    let mut properties = Vec::new();
    let mut depth = 0_i32;
    let mut start = 0;
    for (i, c) in with.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                properties.push(&with[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    properties.push(&with[start..]);
    properties
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('\'').to_string()
}

fn parse_array(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches("ARRAY[")
        .trim_end_matches(']')
        .split(',')
        .map(unquote)
        .filter(|v| !v.is_empty())
        .collect()
}

/// Simulated CTAS engine over an in-memory catalog and store.
#[derive(Debug, Clone)]
pub struct CtasSimulator {
    catalog: Arc<InMemoryCatalog>,
    storage: MemoryBackend,
    failing: Arc<RwLock<BTreeSet<String>>>,
}

impl CtasSimulator {
    /// Creates a simulator writing into `catalog` and `storage`.
    pub fn new(catalog: Arc<InMemoryCatalog>, storage: MemoryBackend) -> Self {
        Self {
            catalog,
            storage,
            failing: Arc::default(),
        }
    }

    /// Makes every CTAS reading `source_table` fail.
    pub fn fail_table(&self, source_table: impl Into<String>) {
        self.failing.write().expect("lock").insert(source_table.into());
    }

    /// A query service driven by this simulator. Results go to `storage`.
    pub fn query_service(&self) -> InMemoryQueryService {
        let simulator = self.clone();
        InMemoryQueryService::with_handler(move |request| simulator.handle(request))
            .with_results_storage(self.storage.clone())
    }

    /// Decides the outcome of one statement.
    pub fn handle(&self, request: &StartQueryRequest) -> ScriptedOutcome {
        let Some(ctas) = parse_ctas(&request.query) else {
            return ScriptedOutcome::succeeded();
        };
        if self.failing.read().expect("lock").contains(&ctas.source_table) {
            return ScriptedOutcome::failed(format!(
                "simulated failure reading {}.{}",
                ctas.source_database, ctas.source_table
            ))
            .with_pending_polls(1);
        }
        match self.materialize(&ctas) {
            Ok(bytes) => ScriptedOutcome::succeeded()
                .with_pending_polls(2)
                .with_statistics(bytes, SIMULATED_RUNTIME_MS),
            Err(reason) => ScriptedOutcome::failed(reason),
        }
    }

    fn materialize(&self, ctas: &ParsedCtas) -> Result<u64, String> {
        let source = self
            .catalog
            .table(&ctas.source_database, &ctas.source_table)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Table {}.{} not found", ctas.source_database, ctas.source_table))?;
        let format = StorageFormat::parse(&ctas.format).map_err(|e| e.to_string())?;
        let target_location = ctas.external_location.clone();

        let mut all_columns: Vec<Column> = source.columns().to_vec();
        all_columns.extend(source.partition_keys.iter().cloned());
        let model = TableModel::new(
            &ctas.target_database,
            &ctas.target_table,
            &all_columns,
            format,
            &target_location,
            &ctas.partitioned_by,
        );
        let data_columns = model.columns.clone();
        let keys_line_up = source
            .partition_keys
            .iter()
            .map(|k| k.name.as_str())
            .eq(ctas.partitioned_by.iter().map(String::as_str));
        self.catalog.insert_table(model.to_table()).map_err(|e| e.to_string())?;

        let source_location = source.location().unwrap_or_default().to_string();
        let mut scanned = 0_u64;
        if !source_location.is_empty() {
            for key in self.storage.keys().map_err(|e| e.to_string())? {
                if !key.starts_with(&source_location) || key.ends_with('/') {
                    continue;
                }
                let data = self
                    .storage
                    .get(&key)
                    .map_err(|e| e.to_string())?
                    .unwrap_or_default();
                scanned += u64::try_from(data.len()).unwrap_or(u64::MAX);
                self.storage
                    .put(relocate(&key, &source_location, &target_location), data)
                    .map_err(|e| e.to_string())?;
            }
        }

        if keys_line_up && !ctas.partitioned_by.is_empty() {
            let partitions = self
                .catalog
                .partitions(&ctas.source_database, &ctas.source_table)
                .map_err(|e| e.to_string())?;
            for partition in partitions {
                let location = partition
                    .location()
                    .map_or_else(|| target_location.clone(), |l| relocate(l, &source_location, &target_location));
                let created = Partition {
                    values: partition.values,
                    storage: StorageDescriptor::for_format(format, data_columns.clone(), location),
                    parameters: std::collections::BTreeMap::new(),
                };
                self.catalog
                    .insert_partition(&ctas.target_database, &ctas.target_table, created)
                    .map_err(|e| e.to_string())?;
            }
        }

        Ok(scanned)
    }
}
