//! Catalog records: databases, tables, columns and partitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use recast_core::{SerdeInfo, StorageFormat};

/// Table type written for every generated table.
pub const EXTERNAL_TABLE: &str = "EXTERNAL_TABLE";

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column type as understood by the query engine (`string`, `bigint`, ...).
    #[serde(rename = "type")]
    pub data_type: String,
    /// Free-form comment. Dropped on writes and ignored by comparisons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Column {
    /// Creates a column without a comment.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            comment: None,
        }
    }

    /// Returns a copy with the comment removed.
    #[must_use]
    pub fn without_comment(&self) -> Self {
        Self::new(self.name.clone(), self.data_type.clone())
    }
}

/// Strips comments from every column.
#[must_use]
pub fn strip_comments(columns: &[Column]) -> Vec<Column> {
    columns.iter().map(Column::without_comment).collect()
}

/// Physical layout of a table or partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDescriptor {
    /// Data columns.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Object storage prefix holding the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Hadoop input format class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_format: Option<String>,
    /// Hadoop output format class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// Serde settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serde_info: Option<SerdeInfo>,
}

impl StorageDescriptor {
    /// Builds the descriptor for `format` at `location`.
    #[must_use]
    pub fn for_format(format: StorageFormat, columns: Vec<Column>, location: impl Into<String>) -> Self {
        let descriptor = format.descriptor();
        Self {
            columns,
            location: Some(location.into()),
            input_format: Some(descriptor.input_format.to_string()),
            output_format: Some(descriptor.output_format.to_string()),
            serde_info: Some(descriptor.serde_info()),
        }
    }
}

/// A catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Owning database.
    pub database: String,
    /// Table name.
    pub name: String,
    /// Table type, `EXTERNAL_TABLE` for generated tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_type: Option<String>,
    /// Storage descriptor, including the data columns.
    #[serde(default)]
    pub storage: StorageDescriptor,
    /// Partition keys, disjoint from the data columns.
    #[serde(default)]
    pub partition_keys: Vec<Column>,
    /// Table parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Table {
    /// Data columns.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.storage.columns
    }

    /// Storage location, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.storage.location.as_deref()
    }

    /// Returns true if the table has partition keys.
    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        !self.partition_keys.is_empty()
    }

    /// `database.table`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }
}

/// A partition of a table, identified by its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    /// One value per partition key, in key order.
    pub values: Vec<String>,
    /// Storage descriptor of the partition.
    #[serde(default)]
    pub storage: StorageDescriptor,
    /// Partition parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Partition {
    /// Storage location, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.storage.location.as_deref()
    }
}

/// A catalog database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    /// Database name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Database {
    /// Creates a database record with no description.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}
