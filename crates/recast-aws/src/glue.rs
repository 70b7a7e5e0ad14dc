//! AWS Glue implementation of [`CatalogService`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_glue::error::BuildError;
use aws_sdk_glue::types as glue;
use aws_sdk_glue::Client;

use recast_catalog::{CatalogError, CatalogService, Column, Database, Page, Partition, Result, StorageDescriptor, Table};
use recast_core::SerdeInfo;

use crate::fault::catalog_error;

/// Partitions per `BatchCreatePartition` call.
pub const CREATE_PARTITION_BATCH: usize = 100;

/// Partitions per `BatchDeletePartition` call.
pub const DELETE_PARTITION_BATCH: usize = 25;

/// Glue Data Catalog client.
#[derive(Debug, Clone)]
pub struct GlueCatalog {
    client: Client,
}

impl GlueCatalog {
    /// Wraps an SDK client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a client from shared AWS configuration.
    #[must_use]
    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

fn invalid_input(err: BuildError) -> CatalogError {
    CatalogError::service_with_source("invalid glue request", err)
}

fn qualified(database: &str, table: &str) -> String {
    format!("{database}.{table}")
}

fn to_btree(map: Option<&HashMap<String, String>>) -> BTreeMap<String, String> {
    map.map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn to_hash(map: &BTreeMap<String, String>) -> Option<HashMap<String, String>> {
    if map.is_empty() {
        return None;
    }
    Some(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Converts a Glue column.
#[must_use]
pub fn column_from_glue(column: &glue::Column) -> Column {
    Column {
        name: column.name().to_string(),
        data_type: column.r#type().unwrap_or_default().to_string(),
        comment: column.comment().map(str::to_string),
    }
}

/// Converts a column to its Glue form. Comments are not written.
pub fn column_to_glue(column: &Column) -> Result<glue::Column> {
    glue::Column::builder()
        .name(&column.name)
        .r#type(&column.data_type)
        .build()
        .map_err(invalid_input)
}

fn columns_to_glue(columns: &[Column]) -> Result<Vec<glue::Column>> {
    columns.iter().map(column_to_glue).collect()
}

/// Converts a Glue storage descriptor.
#[must_use]
pub fn storage_from_glue(storage: Option<&glue::StorageDescriptor>) -> StorageDescriptor {
    let Some(storage) = storage else {
        return StorageDescriptor::default();
    };
    StorageDescriptor {
        columns: storage.columns().iter().map(column_from_glue).collect(),
        location: storage.location().map(str::to_string),
        input_format: storage.input_format().map(str::to_string),
        output_format: storage.output_format().map(str::to_string),
        serde_info: storage.serde_info().map(|serde| SerdeInfo {
            serialization_library: serde.serialization_library().unwrap_or_default().to_string(),
            parameters: to_btree(serde.parameters()),
        }),
    }
}

/// Converts a storage descriptor to its Glue form.
pub fn storage_to_glue(storage: &StorageDescriptor) -> Result<glue::StorageDescriptor> {
    let serde_info = storage.serde_info.as_ref().map(|serde| {
        glue::SerDeInfo::builder()
            .serialization_library(&serde.serialization_library)
            .set_parameters(to_hash(&serde.parameters))
            .build()
    });
    Ok(glue::StorageDescriptor::builder()
        .set_columns(Some(columns_to_glue(&storage.columns)?))
        .set_location(storage.location.clone())
        .set_input_format(storage.input_format.clone())
        .set_output_format(storage.output_format.clone())
        .set_serde_info(serde_info)
        .build())
}

/// Converts a Glue table. `database` fills in a missing database name.
#[must_use]
pub fn table_from_glue(database: &str, table: &glue::Table) -> Table {
    Table {
        database: table.database_name().unwrap_or(database).to_string(),
        name: table.name().to_string(),
        table_type: table.table_type().map(str::to_string),
        storage: storage_from_glue(table.storage_descriptor()),
        partition_keys: table.partition_keys().iter().map(column_from_glue).collect(),
        parameters: to_btree(table.parameters()),
    }
}

/// Converts a table to a Glue `TableInput`.
pub fn table_to_glue(table: &Table) -> Result<glue::TableInput> {
    glue::TableInput::builder()
        .name(&table.name)
        .set_table_type(table.table_type.clone())
        .storage_descriptor(storage_to_glue(&table.storage)?)
        .set_partition_keys(Some(columns_to_glue(&table.partition_keys)?))
        .set_parameters(to_hash(&table.parameters))
        .build()
        .map_err(invalid_input)
}

/// Converts a Glue partition.
#[must_use]
pub fn partition_from_glue(partition: &glue::Partition) -> Partition {
    Partition {
        values: partition.values().to_vec(),
        storage: storage_from_glue(partition.storage_descriptor()),
        parameters: to_btree(partition.parameters()),
    }
}

/// Converts a partition to a Glue `PartitionInput`.
pub fn partition_to_glue(partition: &Partition) -> Result<glue::PartitionInput> {
    Ok(glue::PartitionInput::builder()
        .set_values(Some(partition.values.clone()))
        .storage_descriptor(storage_to_glue(&partition.storage)?)
        .set_parameters(to_hash(&partition.parameters))
        .build())
}

/// Fails on batch errors other than "already exists".
fn check_partition_errors(errors: &[glue::PartitionError], table: &str) -> Result<()> {
    let mut failed = Vec::new();
    for error in errors {
        let detail = error.error_detail();
        let code = detail.and_then(glue::ErrorDetail::error_code);
        if code == Some("AlreadyExistsException") {
            tracing::debug!(table, values = ?error.partition_values(), "partition already exists");
            continue;
        }
        failed.push(format!(
            "{:?}: {}",
            error.partition_values(),
            detail.and_then(glue::ErrorDetail::error_message).unwrap_or("unknown error")
        ));
    }
    if failed.is_empty() {
        return Ok(());
    }
    Err(CatalogError::service(format!(
        "{} partition(s) of {table} failed: {}",
        failed.len(),
        failed.join("; ")
    )))
}

#[async_trait]
impl CatalogService for GlueCatalog {
    async fn get_database(&self, name: &str) -> Result<Database> {
        let output = self
            .client
            .get_database()
            .name(name)
            .send()
            .await
            .map_err(|e| catalog_error(e, "database", name))?;
        let database = output
            .database()
            .ok_or_else(|| CatalogError::not_found("database", name))?;
        Ok(Database {
            name: database.name().to_string(),
            description: database.description().map(str::to_string),
        })
    }

    async fn create_database(&self, database: Database) -> Result<()> {
        let input = glue::DatabaseInput::builder()
            .name(&database.name)
            .set_description(database.description.clone())
            .build()
            .map_err(invalid_input)?;
        self.client
            .create_database()
            .database_input(input)
            .send()
            .await
            .map_err(|e| catalog_error(e, "database", &database.name))?;
        Ok(())
    }

    async fn get_table(&self, database: &str, name: &str) -> Result<Table> {
        let output = self
            .client
            .get_table()
            .database_name(database)
            .name(name)
            .send()
            .await
            .map_err(|e| catalog_error(e, "table", &qualified(database, name)))?;
        output
            .table()
            .map(|table| table_from_glue(database, table))
            .ok_or_else(|| CatalogError::not_found("table", qualified(database, name)))
    }

    async fn create_table(&self, table: Table) -> Result<()> {
        self.client
            .create_table()
            .database_name(&table.database)
            .table_input(table_to_glue(&table)?)
            .send()
            .await
            .map_err(|e| catalog_error(e, "table", &table.qualified_name()))?;
        Ok(())
    }

    async fn update_table(&self, table: Table) -> Result<()> {
        self.client
            .update_table()
            .database_name(&table.database)
            .table_input(table_to_glue(&table)?)
            .send()
            .await
            .map_err(|e| catalog_error(e, "table", &table.qualified_name()))?;
        Ok(())
    }

    async fn delete_table(&self, database: &str, name: &str) -> Result<()> {
        self.client
            .delete_table()
            .database_name(database)
            .name(name)
            .send()
            .await
            .map_err(|e| catalog_error(e, "table", &qualified(database, name)))?;
        Ok(())
    }

    async fn get_tables(&self, database: &str, page_token: Option<&str>) -> Result<Page<Table>> {
        let output = self
            .client
            .get_tables()
            .database_name(database)
            .set_next_token(page_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| catalog_error(e, "database", database))?;
        Ok(Page {
            items: output
                .table_list()
                .iter()
                .map(|table| table_from_glue(database, table))
                .collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn get_partitions(
        &self,
        database: &str,
        table: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Partition>> {
        let output = self
            .client
            .get_partitions()
            .database_name(database)
            .table_name(table)
            .set_next_token(page_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| catalog_error(e, "table", &qualified(database, table)))?;
        Ok(Page {
            items: output.partitions().iter().map(partition_from_glue).collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn create_partition(&self, database: &str, table: &str, partition: Partition) -> Result<()> {
        self.client
            .create_partition()
            .database_name(database)
            .table_name(table)
            .partition_input(partition_to_glue(&partition)?)
            .send()
            .await
            .map_err(|e| catalog_error(e, "partition", &format!("{database}.{table}{:?}", partition.values)))?;
        Ok(())
    }

    async fn batch_create_partitions(
        &self,
        database: &str,
        table: &str,
        partitions: Vec<Partition>,
    ) -> Result<()> {
        let name = qualified(database, table);
        for chunk in partitions.chunks(CREATE_PARTITION_BATCH) {
            let inputs = chunk.iter().map(partition_to_glue).collect::<Result<Vec<_>>>()?;
            let output = self
                .client
                .batch_create_partition()
                .database_name(database)
                .table_name(table)
                .set_partition_input_list(Some(inputs))
                .send()
                .await
                .map_err(|e| catalog_error(e, "table", &name))?;
            check_partition_errors(output.errors(), &name)?;
            tracing::debug!(table = %name, count = chunk.len(), "created partition batch");
        }
        Ok(())
    }

    async fn batch_delete_partitions(
        &self,
        database: &str,
        table: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()> {
        let name = qualified(database, table);
        for chunk in values.chunks(DELETE_PARTITION_BATCH) {
            let targets = chunk
                .iter()
                .map(|values| {
                    glue::PartitionValueList::builder()
                        .set_values(Some(values.clone()))
                        .build()
                        .map_err(invalid_input)
                })
                .collect::<Result<Vec<_>>>()?;
            let output = self
                .client
                .batch_delete_partition()
                .database_name(database)
                .table_name(table)
                .set_partitions_to_delete(Some(targets))
                .send()
                .await
                .map_err(|e| catalog_error(e, "table", &name))?;
            check_partition_errors(output.errors(), &name)?;
            tracing::debug!(table = %name, count = chunk.len(), "deleted partition batch");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use recast_catalog::TableModel;
    use recast_core::StorageFormat;

    fn events() -> Table {
        let columns = vec![
            Column::new("id", "int"),
            Column {
                comment: Some("event time".into()),
                ..Column::new("ts", "timestamp")
            },
            Column::new("dt", "string"),
        ];
        TableModel::new(
            "curated",
            "events",
            &columns,
            StorageFormat::Parquet,
            "s3://lake/curated/events/",
            &["dt".to_string()],
        )
        .to_table()
    }

    #[test]
    fn table_input_carries_storage_and_keys() {
        let input = table_to_glue(&events()).unwrap();
        assert_eq!(input.name(), "events");
        let storage = input.storage_descriptor().unwrap();
        assert_eq!(storage.location(), Some("s3://lake/curated/events/"));
        let names: Vec<&str> = storage.columns().iter().map(glue::Column::name).collect();
        assert_eq!(names, vec!["id", "ts"]);
        assert!(storage.columns().iter().all(|c| c.comment().is_none()));
        assert_eq!(input.partition_keys()[0].name(), "dt");
        assert_eq!(
            storage.serde_info().unwrap().serialization_library(),
            Some(StorageFormat::Parquet.descriptor().serde_library)
        );
        assert_eq!(input.parameters().unwrap()["classification"], "parquet");
    }

    #[test]
    fn glue_table_converts_back() {
        let table = events();
        let glue_table = glue::Table::builder()
            .name("events")
            .storage_descriptor(storage_to_glue(&table.storage).unwrap())
            .set_partition_keys(Some(columns_to_glue(&table.partition_keys).unwrap()))
            .build()
            .unwrap();

        let converted = table_from_glue("curated", &glue_table);
        assert_eq!(converted.database, "curated");
        assert_eq!(converted.location(), Some("s3://lake/curated/events/"));
        assert_eq!(converted.partition_keys, vec![Column::new("dt", "string")]);
        assert_eq!(converted.storage.serde_info, table.storage.serde_info);
        assert!(converted.parameters.is_empty());
    }

    #[test]
    fn existing_partitions_in_a_batch_are_not_errors() {
        let exists = glue::PartitionError::builder()
            .partition_values("2024-01-01")
            .error_detail(
                glue::ErrorDetail::builder()
                    .error_code("AlreadyExistsException")
                    .build(),
            )
            .build();
        let broken = glue::PartitionError::builder()
            .partition_values("2024-01-02")
            .error_detail(
                glue::ErrorDetail::builder()
                    .error_code("InternalServiceException")
                    .error_message("boom")
                    .build(),
            )
            .build();

        assert!(check_partition_errors(&[exists.clone()], "curated.events").is_ok());
        let err = check_partition_errors(&[exists, broken], "curated.events").unwrap_err();
        assert!(err.to_string().contains("1 partition(s) of curated.events failed"));
        assert!(err.to_string().contains("boom"));
    }
}
