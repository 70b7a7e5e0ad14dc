//! Partition metadata copying between tables.
//!
//! Only catalog entries move here. Data files are copied separately by
//! [`CatalogClient::copy_table`] when asked to.

use std::collections::{BTreeMap, HashSet};

use crate::client::CatalogClient;
use crate::error::Result;
use crate::types::{strip_comments, Partition, StorageDescriptor};

/// Copies partitions the destination table does not have yet.
#[derive(Debug, Clone)]
pub struct PartitionSynchronizer {
    client: CatalogClient,
}

impl PartitionSynchronizer {
    /// Creates a synchronizer over the given client.
    #[must_use]
    pub fn new(client: CatalogClient) -> Self {
        Self { client }
    }

    /// Copies missing partitions from the source table to the destination
    /// table, returning how many were created.
    ///
    /// Nothing is copied when the destination is unpartitioned or its
    /// partition keys differ from the source's. A copied partition's location
    /// has the source table location replaced by the destination table
    /// location, and its formats and serde come from the destination table.
    #[tracing::instrument(skip(self))]
    pub async fn sync(
        &self,
        source_database: &str,
        target_database: &str,
        source_table: &str,
        target_table: &str,
    ) -> Result<usize> {
        let target_keys = self
            .client
            .get_partition_keys(target_database, target_table)
            .await?;
        if target_keys.is_empty() {
            return Ok(0);
        }

        let source_keys = self
            .client
            .get_partition_keys(source_database, source_table)
            .await?;
        if source_keys != target_keys {
            tracing::warn!(?source_keys, ?target_keys, "partition keys differ; skipping partition copy");
            return Ok(0);
        }

        let existing: HashSet<Vec<String>> = self
            .client
            .list_partition_values(target_database, target_table)
            .await?
            .into_iter()
            .collect();

        let source_location = self.client.get_location(source_database, source_table).await?;
        let target_location = self.client.get_location(target_database, target_table).await?;
        let template = self
            .client
            .get_table(target_database, target_table)
            .await?
            .map(|t| t.storage)
            .unwrap_or_default();

        let mut partitions: Vec<Partition> = self
            .client
            .list_partitions(source_database, source_table)
            .await?
            .into_iter()
            .filter(|p| !existing.contains(&p.values))
            .map(|p| relocate_partition(&p, &template, &source_location, &target_location))
            .collect();

        let count = partitions.len();
        let service = self.client.service();
        match count {
            0 => {}
            1 => {
                if let Some(partition) = partitions.pop() {
                    service
                        .create_partition(target_database, target_table, partition)
                        .await?;
                }
            }
            _ => {
                service
                    .batch_create_partitions(target_database, target_table, partitions)
                    .await?;
            }
        }

        tracing::info!(count, "copied partitions");
        Ok(count)
    }
}

/// Builds the destination copy of a source partition.
#[must_use]
pub fn relocate_partition(
    partition: &Partition,
    template: &StorageDescriptor,
    source_location: &str,
    target_location: &str,
) -> Partition {
    let location = partition
        .location()
        .map(|location| location.replace(source_location, target_location));

    Partition {
        values: partition.values.clone(),
        storage: StorageDescriptor {
            columns: strip_comments(&partition.storage.columns),
            location,
            input_format: template.input_format.clone(),
            output_format: template.output_format.clone(),
            serde_info: template.serde_info.clone(),
        },
        parameters: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;
    use recast_core::StorageFormat;

    #[test]
    fn relocation_rewrites_prefix_and_takes_destination_formats() {
        let source = Partition {
            values: vec!["2024-01-02".into()],
            storage: StorageDescriptor {
                columns: vec![Column {
                    name: "id".into(),
                    data_type: "bigint".into(),
                    comment: Some("pk".into()),
                }],
                ..StorageDescriptor::for_format(
                    StorageFormat::Csv,
                    vec![],
                    "s3://lake/ctas/ctas_events/dt=2024-01-02/",
                )
            },
            parameters: BTreeMap::new(),
        };
        let template = StorageDescriptor::for_format(StorageFormat::Parquet, vec![], "s3://lake/events/");

        let copy = relocate_partition(&source, &template, "s3://lake/ctas/ctas_events/", "s3://lake/events/");

        assert_eq!(copy.location(), Some("s3://lake/events/dt=2024-01-02/"));
        assert_eq!(copy.storage.columns, vec![Column::new("id", "bigint")]);
        assert_eq!(copy.storage.input_format, template.input_format);
        assert_eq!(copy.storage.serde_info, template.serde_info);
    }
}
