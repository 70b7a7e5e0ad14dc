//! Schema reconciliation between a candidate table and the catalog.
//!
//! A candidate is built from a flat column list plus the names of the columns
//! that should become partition keys. Those columns move out of the data
//! columns into the partition keys, in the order the names were given; names
//! that match no column are dropped.
//!
//! Reconciling the candidate with an existing table follows a [`MergePolicy`]:
//!
//! - **Merge** keeps every existing column and key, replaces same-name entries
//!   with the candidate's definition and appends wholly new entries. Any column
//!   that became a partition key is removed from the data columns.
//! - **Overwrite** replaces the table wholesale unless it is already equal.
//!
//! Partition keys compare as ordered sequences. Data columns compare as
//! multisets of `(name, type)`. Comments never take part in a comparison.
//!
//! Running the same reconciliation twice yields [`Reconciliation::Unchanged`]
//! the second time, which is what makes repeated conversions idempotent.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use recast_core::StorageFormat;

use crate::types::{strip_comments, Column, StorageDescriptor, Table, EXTERNAL_TABLE};

/// How to reconcile a candidate with an existing table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Merge the candidate into the existing definition.
    #[default]
    Merge,
    /// Replace the existing definition if it differs.
    Overwrite,
}

/// Selects the columns named by `partition_columns`, in that order.
///
/// Unknown names are skipped.
#[must_use]
pub fn select_partition_keys(columns: &[Column], partition_columns: &[String]) -> Vec<Column> {
    let by_name: BTreeMap<&str, &Column> = columns.iter().map(|c| (c.name.as_str(), c)).collect();
    partition_columns
        .iter()
        .filter_map(|name| by_name.get(name.as_str()).map(|c| (*c).clone()))
        .collect()
}

/// Returns `columns` without any column sharing a name with `exclude`.
#[must_use]
pub fn remove_columns(columns: &[Column], exclude: &[Column]) -> Vec<Column> {
    let excluded: HashSet<&str> = exclude.iter().map(|c| c.name.as_str()).collect();
    columns
        .iter()
        .filter(|c| !excluded.contains(c.name.as_str()))
        .cloned()
        .collect()
}

/// Merges `new` on top of `old`.
///
/// Old entries keep their position and are replaced by a same-name entry from
/// `new`. Entries of `new` with no counterpart in `old` are appended in order.
#[must_use]
pub fn merge_columns(old: &[Column], new: &[Column]) -> Vec<Column> {
    let replacements: BTreeMap<&str, &Column> = new.iter().map(|c| (c.name.as_str(), c)).collect();
    let old_names: HashSet<&str> = old.iter().map(|c| c.name.as_str()).collect();

    let mut merged: Vec<Column> = old
        .iter()
        .map(|c| (*replacements.get(c.name.as_str()).unwrap_or(&c)).clone())
        .collect();
    merged.extend(
        new.iter()
            .filter(|c| !old_names.contains(c.name.as_str()))
            .cloned(),
    );
    merged
}

/// Compares two column lists as multisets of `(name, type)`.
#[must_use]
pub fn columns_equal(left: &[Column], right: &[Column]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut left = strip_comments(left);
    let mut right = strip_comments(right);
    left.sort();
    right.sort();
    left == right
}

/// The candidate definition of a table to write to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableModel {
    /// Database name.
    pub database: String,
    /// Table name.
    pub name: String,
    /// Data columns, comments stripped.
    pub columns: Vec<Column>,
    /// Partition keys, comments stripped.
    pub partition_keys: Vec<Column>,
    /// Storage format.
    pub format: StorageFormat,
    /// Storage location.
    pub location: String,
}

impl TableModel {
    /// Builds a candidate from a flat column list.
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        name: impl Into<String>,
        columns: &[Column],
        format: StorageFormat,
        location: impl Into<String>,
        partition_columns: &[String],
    ) -> Self {
        let columns = strip_comments(columns);
        let partition_keys = select_partition_keys(&columns, partition_columns);
        let columns = remove_columns(&columns, &partition_keys);
        Self {
            database: database.into(),
            name: name.into(),
            columns,
            partition_keys,
            format,
            location: location.into(),
        }
    }

    /// Returns true if `existing` has the same partition key sequence and the
    /// same column multiset.
    #[must_use]
    pub fn equals(&self, existing: &Table) -> bool {
        strip_comments(&existing.partition_keys) == self.partition_keys
            && columns_equal(&self.columns, existing.columns())
    }

    /// Merges the existing definition into this candidate.
    ///
    /// Returns true if the merged result differs from `existing`.
    pub fn merge_existing(&mut self, existing: &Table) -> bool {
        let old_keys = strip_comments(&existing.partition_keys);
        self.partition_keys = merge_columns(&old_keys, &self.partition_keys);
        let keys_changed = self.partition_keys != old_keys;

        let old_columns = strip_comments(existing.columns());
        let merged = merge_columns(&old_columns, &self.columns);
        self.columns = remove_columns(&merged, &self.partition_keys);
        let columns_changed = !columns_equal(&self.columns, &old_columns);

        keys_changed || columns_changed
    }

    /// Builds the catalog table for this candidate.
    #[must_use]
    pub fn to_table(&self) -> Table {
        Table {
            database: self.database.clone(),
            name: self.name.clone(),
            table_type: Some(EXTERNAL_TABLE.to_string()),
            storage: StorageDescriptor::for_format(self.format, self.columns.clone(), &self.location),
            partition_keys: self.partition_keys.clone(),
            parameters: self.format.table_parameters(),
        }
    }
}

/// The catalog write needed to bring a table in line with a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The table does not exist and must be created.
    Create(Table),
    /// The table exists and must be replaced with this definition.
    Update(Table),
    /// The table already matches; nothing to write.
    Unchanged,
}

impl Reconciliation {
    /// Returns true if a catalog write is needed.
    #[must_use]
    pub const fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Decides how to reconcile `model` with the `existing` table.
#[must_use]
pub fn reconcile(mut model: TableModel, existing: Option<&Table>, policy: MergePolicy) -> Reconciliation {
    let Some(existing) = existing else {
        return Reconciliation::Create(model.to_table());
    };

    let changed = match policy {
        MergePolicy::Overwrite => !model.equals(existing),
        MergePolicy::Merge => model.merge_existing(existing),
    };

    if changed {
        Reconciliation::Update(model.to_table())
    } else {
        Reconciliation::Unchanged
    }
}
