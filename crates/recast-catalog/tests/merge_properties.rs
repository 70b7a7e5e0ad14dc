//! Property-based tests for schema reconciliation.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashSet;

use proptest::prelude::*;

use recast_catalog::merge::{columns_equal, reconcile, MergePolicy, Reconciliation, TableModel};
use recast_catalog::Column;
use recast_core::StorageFormat;

/// Generates a column list with unique names.
fn arb_columns() -> impl Strategy<Value = Vec<Column>> {
    prop::collection::btree_map(
        "[a-z][a-z0-9_]{0,8}",
        prop::sample::select(vec!["int", "bigint", "string", "date", "double"]),
        1..8,
    )
    .prop_map(|columns| {
        columns
            .into_iter()
            .map(|(name, data_type)| Column::new(name, data_type))
            .collect()
    })
}

/// Generates columns plus a subset of their names (and some unknown names) to
/// partition by.
fn arb_candidate() -> impl Strategy<Value = (Vec<Column>, Vec<String>)> {
    arb_columns().prop_flat_map(|columns| {
        let mut names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        names.push("not_a_column".to_string());
        let picks = prop::sample::subsequence(names.clone(), 0..=names.len()).prop_shuffle();
        (Just(columns), picks)
    })
}

fn model(columns: &[Column], partition_columns: &[String]) -> TableModel {
    TableModel::new(
        "analytics",
        "events",
        columns,
        StorageFormat::Parquet,
        "s3://lake/events/",
        partition_columns,
    )
}

proptest! {
    #[test]
    fn partition_keys_never_overlap_columns((columns, partition_by) in arb_candidate()) {
        let candidate = model(&columns, &partition_by);
        let data: HashSet<&str> = candidate.columns.iter().map(|c| c.name.as_str()).collect();
        for key in &candidate.partition_keys {
            prop_assert!(!data.contains(key.name.as_str()));
        }
        prop_assert_eq!(candidate.columns.len() + candidate.partition_keys.len(), columns.len());
    }

    #[test]
    fn merged_tables_keep_keys_out_of_columns(
        (old_columns, old_partition_by) in arb_candidate(),
        (new_columns, new_partition_by) in arb_candidate(),
    ) {
        let existing = model(&old_columns, &old_partition_by).to_table();
        let reconciliation = reconcile(model(&new_columns, &new_partition_by), Some(&existing), MergePolicy::Merge);
        if let Reconciliation::Update(table) = reconciliation {
            let keys: HashSet<&str> = table.partition_keys.iter().map(|c| c.name.as_str()).collect();
            prop_assert!(table.columns().iter().all(|c| !keys.contains(c.name.as_str())));
        }
    }

    #[test]
    fn reconciling_twice_is_idempotent(
        (old_columns, old_partition_by) in arb_candidate(),
        (new_columns, new_partition_by) in arb_candidate(),
    ) {
        let existing = model(&old_columns, &old_partition_by).to_table();
        let merged = match reconcile(model(&new_columns, &new_partition_by), Some(&existing), MergePolicy::Merge) {
            Reconciliation::Update(table) => table,
            Reconciliation::Unchanged => existing,
            Reconciliation::Create(_) => unreachable!("table exists"),
        };
        let again = reconcile(model(&new_columns, &new_partition_by), Some(&merged), MergePolicy::Merge);
        prop_assert_eq!(again, Reconciliation::Unchanged);
    }

    #[test]
    fn columns_equal_is_order_insensitive(columns in arb_columns(), seed in any::<u64>()) {
        let mut shuffled = columns.clone();
        let len = shuffled.len();
        #[allow(clippy::cast_possible_truncation)]
        shuffled.rotate_left((seed as usize) % len);
        prop_assert!(columns_equal(&columns, &shuffled));
    }
}
