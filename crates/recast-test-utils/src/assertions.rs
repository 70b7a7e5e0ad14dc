//! Custom assertion helpers for integration tests.

use recast_catalog::{Column, InMemoryCatalog};

use crate::storage::{StorageOp, TracingMemoryBackend};

/// Asserts that a table exists with exactly these data columns, in order.
///
/// # Panics
///
/// Panics if the table is missing or its columns differ.
pub fn assert_table_columns(catalog: &InMemoryCatalog, database: &str, table: &str, expected: &[Column]) {
    let found = catalog
        .table(database, table)
        .expect("catalog read")
        .unwrap_or_else(|| panic!("expected table {database}.{table} to exist"));
    assert_eq!(found.columns(), expected, "columns of {database}.{table}");
}

/// Asserts that a table does not exist.
///
/// # Panics
///
/// Panics if the table exists.
pub fn assert_table_absent(catalog: &InMemoryCatalog, database: &str, table: &str) {
    assert!(
        catalog.table(database, table).expect("catalog read").is_none(),
        "expected table {database}.{table} to be deleted"
    );
}

/// Asserts the sorted partition value tuples of a table.
///
/// # Panics
///
/// Panics if the partitions differ.
pub fn assert_partition_values(catalog: &InMemoryCatalog, database: &str, table: &str, expected: &[&[&str]]) {
    let mut found: Vec<Vec<String>> = catalog
        .partitions(database, table)
        .expect("catalog read")
        .into_iter()
        .map(|p| p.values)
        .collect();
    found.sort();
    let mut expected: Vec<Vec<String>> = expected
        .iter()
        .map(|values| values.iter().map(|v| (*v).to_string()).collect())
        .collect();
    expected.sort();
    assert_eq!(found, expected, "partitions of {database}.{table}");
}

/// Asserts that no storage operation deleted anything under `prefix`.
///
/// # Panics
///
/// Panics if a delete touched `prefix`.
pub fn assert_not_deleted(storage: &TracingMemoryBackend, prefix: &str) {
    for op in storage.operations() {
        if let StorageOp::Delete { prefix: deleted } = op {
            assert!(
                !deleted.starts_with(prefix) && !prefix.starts_with(&deleted),
                "unexpected delete of {deleted} overlapping {prefix}"
            );
        }
    }
}
