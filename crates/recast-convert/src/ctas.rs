//! CREATE TABLE AS SELECT statement generation.
//!
//! The statement text is consumed by the external query engine, so the clause
//! order is fixed:
//!
//! ```text
//! create table <db>.<table> with (format='<f>',external_location='<uri>',
//!     <f>_compression='<c>'[,partitioned_by=ARRAY['p',..]]
//!     [,bucketed_by=ARRAY['b',..],bucket_count=<n>])
//! as select <columns> from <db>.<table>
//! ```
//!
//! Values inside the `with` clause are single-quoted. Selected column names
//! are double-quoted.

use recast_core::StorageFormat;

use crate::error::{ConvertError, Result};

/// Prefix of the temporary table a conversion writes into.
pub const TEMP_TABLE_PREFIX: &str = "ctas_";

/// Name of the temporary table used to convert `table`.
#[must_use]
pub fn temp_table_name(table: &str) -> String {
    format!("{TEMP_TABLE_PREFIX}{table}")
}

/// A CTAS statement under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtasStatement {
    source_database: String,
    source_table: String,
    target_database: String,
    target_table: String,
    external_location: String,
    format: StorageFormat,
    partition_columns: Vec<String>,
    bucket_columns: Vec<String>,
    bucket_count: Option<u32>,
}

impl CtasStatement {
    /// Creates an unpartitioned, unbucketed statement.
    #[must_use]
    pub fn new(
        source_database: impl Into<String>,
        source_table: impl Into<String>,
        target_database: impl Into<String>,
        target_table: impl Into<String>,
        external_location: impl Into<String>,
        format: StorageFormat,
    ) -> Self {
        Self {
            source_database: source_database.into(),
            source_table: source_table.into(),
            target_database: target_database.into(),
            target_table: target_table.into(),
            external_location: external_location.into(),
            format,
            partition_columns: Vec::new(),
            bucket_columns: Vec::new(),
            bucket_count: None,
        }
    }

    /// Partitions the output by these columns, in this order.
    #[must_use]
    pub fn partitioned_by(mut self, columns: Vec<String>) -> Self {
        self.partition_columns = columns;
        self
    }

    /// Buckets the output by these columns.
    #[must_use]
    pub fn bucketed_by(mut self, columns: Vec<String>, count: Option<u32>) -> Self {
        self.bucket_columns = columns;
        self.bucket_count = count;
        self
    }

    /// Whether the output is partitioned.
    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        !self.partition_columns.is_empty()
    }

    /// Renders the statement.
    ///
    /// `source_columns` is the source table's column order. It is only
    /// consulted for partitioned output, where the partition columns must come
    /// last in the select list.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if bucket columns are set without a
    /// bucket count.
    pub fn build(&self, source_columns: &[String]) -> Result<String> {
        Ok(format!(
            "create table {}.{} with ({}) as select {} from {}.{}",
            self.target_database,
            self.target_table,
            self.with_clause()?,
            self.select_list(source_columns),
            self.source_database,
            self.source_table,
        ))
    }

    fn with_clause(&self) -> Result<String> {
        let format = self.format.as_str();
        let mut conditions = vec![
            format!("format='{format}'"),
            format!("external_location='{}'", self.external_location),
            format!("{format}_compression='{}'", self.format.descriptor().compression),
        ];

        if self.is_partitioned() {
            conditions.push(format!("partitioned_by=ARRAY[{}]", quote_all(&self.partition_columns, '\'')));
        }

        if !self.bucket_columns.is_empty() {
            let count = self.bucket_count.ok_or_else(|| {
                ConvertError::configuration("bucket_count is required when bucket columns are given")
            })?;
            conditions.push(format!("bucketed_by=ARRAY[{}]", quote_all(&self.bucket_columns, '\'')));
            conditions.push(format!("bucket_count={count}"));
        }

        Ok(conditions.join(","))
    }

    fn select_list(&self, source_columns: &[String]) -> String {
        if !self.is_partitioned() {
            return "*".to_string();
        }
        let ordered: Vec<String> = source_columns
            .iter()
            .filter(|c| !self.partition_columns.contains(*c))
            .chain(&self.partition_columns)
            .cloned()
            .collect();
        quote_all(&ordered, '"')
    }
}

fn quote_all(names: &[String], quote: char) -> String {
    names
        .iter()
        .map(|n| format!("{quote}{n}{quote}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn statement() -> CtasStatement {
        CtasStatement::new(
            "raw",
            "events",
            "curated",
            "ctas_events",
            "s3://lake/curated/ctas/ctas_events/",
            StorageFormat::Parquet,
        )
    }

    #[test]
    fn unpartitioned_selects_everything() {
        let sql = statement().build(&names(&["id", "dt"])).unwrap();
        assert_eq!(
            sql,
            "create table curated.ctas_events with (format='parquet',\
             external_location='s3://lake/curated/ctas/ctas_events/',\
             parquet_compression='snappy') as select * from raw.events"
        );
    }

    #[test]
    fn partition_columns_move_to_the_end() {
        let sql = statement()
            .partitioned_by(names(&["dt", "region"]))
            .build(&names(&["region", "id", "dt", "payload"]))
            .unwrap();
        assert_eq!(
            sql,
            "create table curated.ctas_events with (format='parquet',\
             external_location='s3://lake/curated/ctas/ctas_events/',\
             parquet_compression='snappy',partitioned_by=ARRAY['dt','region']) \
             as select \"id\",\"payload\",\"dt\",\"region\" from raw.events"
        );
    }

    #[test]
    fn bucketing_requires_a_count() {
        let err = statement()
            .bucketed_by(names(&["x"]), None)
            .build(&[])
            .unwrap_err();
        assert!(err.is_configuration());

        let sql = statement().bucketed_by(names(&["x"]), Some(4)).build(&[]).unwrap();
        assert!(sql.contains("bucketed_by=ARRAY['x']"));
        assert!(sql.contains("bucket_count=4"));
        assert!(sql.ends_with("as select * from raw.events"));
    }

    #[test]
    fn text_formats_have_no_compression() {
        let sql = CtasStatement::new("a", "t", "b", "ctas_t", "s3://x/", StorageFormat::Json)
            .build(&[])
            .unwrap();
        assert!(sql.contains("format='json'"));
        assert!(sql.contains("json_compression='none'"));
    }

    #[test]
    fn temp_table_is_prefixed() {
        assert_eq!(temp_table_name("events"), "ctas_events");
    }
}
