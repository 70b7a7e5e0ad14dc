//! In-memory catalog implementation for testing.
//!
//! [`InMemoryCatalog`] implements [`CatalogService`] over a single lock and
//! records every write it accepts, so tests can assert that an idempotent
//! path issued no catalog writes at all.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No persistence
//! - **Page tokens are offsets**: They are only meaningful to this instance

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{CatalogError, Result};
use crate::service::{CatalogService, Page};
use crate::types::{Database, Partition, Table};

/// Default number of items per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A write accepted by the in-memory catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogOp {
    /// A database was created.
    CreateDatabase(String),
    /// A table was created (`db.table`).
    CreateTable(String),
    /// A table was replaced (`db.table`).
    UpdateTable(String),
    /// A table was deleted (`db.table`).
    DeleteTable(String),
    /// One partition was created.
    CreatePartition {
        /// `db.table`.
        table: String,
        /// Partition values.
        values: Vec<String>,
    },
    /// Several partitions were created in one call.
    BatchCreatePartitions {
        /// `db.table`.
        table: String,
        /// Number of partitions.
        count: usize,
    },
    /// Several partitions were deleted in one call.
    BatchDeletePartitions {
        /// `db.table`.
        table: String,
        /// Number of partitions.
        count: usize,
    },
}

type TableKey = (String, String);

#[derive(Debug, Default)]
struct CatalogState {
    databases: BTreeMap<String, Database>,
    tables: BTreeMap<TableKey, Table>,
    partitions: BTreeMap<TableKey, Vec<Partition>>,
    writes: Vec<CatalogOp>,
}

/// In-memory catalog service.
#[derive(Debug)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
    page_size: usize,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn poison_err<T>(_: PoisonError<T>) -> CatalogError {
    CatalogError::Core(recast_core::Error::Internal {
        message: "catalog lock poisoned".into(),
    })
}

fn key(database: &str, table: &str) -> TableKey {
    (database.to_string(), table.to_string())
}

fn qualified(database: &str, table: &str) -> String {
    format!("{database}.{table}")
}

fn paginate<T: Clone>(items: &[T], page_token: Option<&str>, page_size: usize) -> Result<Page<T>> {
    let start = match page_token {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| CatalogError::service(format!("invalid page token '{token}'")))?,
        None => 0,
    };
    let end = start.saturating_add(page_size).min(items.len());
    let page = items.get(start..end).unwrap_or_default().to_vec();
    let next_token = (end < items.len()).then(|| end.to_string());
    Ok(Page {
        items: page,
        next_token,
    })
}

impl InMemoryCatalog {
    /// Creates an empty catalog with the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates an empty catalog that returns at most `page_size` items per page.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            page_size: page_size.max(1),
        }
    }

    /// Seeds a database without recording a write.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_database(&self, name: &str) -> Result<()> {
        self.state
            .write()
            .map_err(poison_err)?
            .databases
            .insert(name.to_string(), Database::new(name));
        Ok(())
    }

    /// Seeds or replaces a table without recording a write. Creates the
    /// database if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_table(&self, table: Table) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state
            .databases
            .entry(table.database.clone())
            .or_insert_with(|| Database::new(table.database.clone()));
        state.tables.insert(key(&table.database, &table.name), table);
        drop(state);
        Ok(())
    }

    /// Seeds a partition without recording a write.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_partition(&self, database: &str, table: &str, partition: Partition) -> Result<()> {
        self.state
            .write()
            .map_err(poison_err)?
            .partitions
            .entry(key(database, table))
            .or_default()
            .push(partition);
        Ok(())
    }

    /// Reads a table directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn table(&self, database: &str, table: &str) -> Result<Option<Table>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.tables.get(&key(database, table)).cloned())
    }

    /// Reads a table's partitions directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn partitions(&self, database: &str, table: &str) -> Result<Vec<Partition>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .partitions
            .get(&key(database, table))
            .cloned()
            .unwrap_or_default())
    }

    /// Returns true if the database exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn has_database(&self, name: &str) -> Result<bool> {
        Ok(self.state.read().map_err(poison_err)?.databases.contains_key(name))
    }

    /// Returns every write accepted so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn writes(&self) -> Result<Vec<CatalogOp>> {
        Ok(self.state.read().map_err(poison_err)?.writes.clone())
    }

    /// Returns the number of writes accepted so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn write_count(&self) -> Result<usize> {
        Ok(self.state.read().map_err(poison_err)?.writes.len())
    }

    fn require_database(state: &CatalogState, database: &str) -> Result<()> {
        if state.databases.contains_key(database) {
            Ok(())
        } else {
            Err(CatalogError::not_found("database", database))
        }
    }

    fn require_table(state: &CatalogState, database: &str, table: &str) -> Result<()> {
        Self::require_database(state, database)?;
        if state.tables.contains_key(&key(database, table)) {
            Ok(())
        } else {
            Err(CatalogError::not_found("table", qualified(database, table)))
        }
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalog {
    async fn get_database(&self, name: &str) -> Result<Database> {
        let state = self.state.read().map_err(poison_err)?;
        state
            .databases
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::not_found("database", name))
    }

    async fn create_database(&self, database: Database) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.databases.contains_key(&database.name) {
            return Err(CatalogError::already_exists("database", database.name));
        }
        state.writes.push(CatalogOp::CreateDatabase(database.name.clone()));
        state.databases.insert(database.name.clone(), database);
        drop(state);
        Ok(())
    }

    async fn get_table(&self, database: &str, name: &str) -> Result<Table> {
        let state = self.state.read().map_err(poison_err)?;
        Self::require_database(&state, database)?;
        state
            .tables
            .get(&key(database, name))
            .cloned()
            .ok_or_else(|| CatalogError::not_found("table", qualified(database, name)))
    }

    async fn create_table(&self, table: Table) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        Self::require_database(&state, &table.database)?;
        let table_key = key(&table.database, &table.name);
        if state.tables.contains_key(&table_key) {
            return Err(CatalogError::already_exists("table", table.qualified_name()));
        }
        state.writes.push(CatalogOp::CreateTable(table.qualified_name()));
        state.tables.insert(table_key, table);
        drop(state);
        Ok(())
    }

    async fn update_table(&self, table: Table) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        Self::require_table(&state, &table.database, &table.name)?;
        state.writes.push(CatalogOp::UpdateTable(table.qualified_name()));
        state.tables.insert(key(&table.database, &table.name), table);
        drop(state);
        Ok(())
    }

    async fn delete_table(&self, database: &str, name: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        Self::require_table(&state, database, name)?;
        let table_key = key(database, name);
        state.tables.remove(&table_key);
        state.partitions.remove(&table_key);
        state.writes.push(CatalogOp::DeleteTable(qualified(database, name)));
        drop(state);
        Ok(())
    }

    async fn get_tables(&self, database: &str, page_token: Option<&str>) -> Result<Page<Table>> {
        let state = self.state.read().map_err(poison_err)?;
        Self::require_database(&state, database)?;
        let tables: Vec<Table> = state
            .tables
            .iter()
            .filter(|((db, _), _)| db == database)
            .map(|(_, table)| table.clone())
            .collect();
        drop(state);
        paginate(&tables, page_token, self.page_size)
    }

    async fn get_partitions(
        &self,
        database: &str,
        table: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Partition>> {
        let state = self.state.read().map_err(poison_err)?;
        Self::require_table(&state, database, table)?;
        let partitions = state
            .partitions
            .get(&key(database, table))
            .cloned()
            .unwrap_or_default();
        drop(state);
        paginate(&partitions, page_token, self.page_size)
    }

    async fn create_partition(&self, database: &str, table: &str, partition: Partition) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        Self::require_table(&state, database, table)?;
        let existing = state.partitions.entry(key(database, table)).or_default();
        if existing.iter().any(|p| p.values == partition.values) {
            return Err(CatalogError::already_exists(
                "partition",
                format!("{}.{} {:?}", database, table, partition.values),
            ));
        }
        let values = partition.values.clone();
        existing.push(partition);
        state.writes.push(CatalogOp::CreatePartition {
            table: qualified(database, table),
            values,
        });
        drop(state);
        Ok(())
    }

    async fn batch_create_partitions(
        &self,
        database: &str,
        table: &str,
        partitions: Vec<Partition>,
    ) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        Self::require_table(&state, database, table)?;
        let count = partitions.len();
        let existing = state.partitions.entry(key(database, table)).or_default();
        for partition in partitions {
            if !existing.iter().any(|p| p.values == partition.values) {
                existing.push(partition);
            }
        }
        state.writes.push(CatalogOp::BatchCreatePartitions {
            table: qualified(database, table),
            count,
        });
        drop(state);
        Ok(())
    }

    async fn batch_delete_partitions(
        &self,
        database: &str,
        table: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        Self::require_table(&state, database, table)?;
        if let Some(existing) = state.partitions.get_mut(&key(database, table)) {
            existing.retain(|p| !values.contains(&p.values));
        }
        state.writes.push(CatalogOp::BatchDeletePartitions {
            table: qualified(database, table),
            count: values.len(),
        });
        drop(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StorageDescriptor;

    fn table(database: &str, name: &str) -> Table {
        Table {
            database: database.into(),
            name: name.into(),
            table_type: None,
            storage: StorageDescriptor::default(),
            partition_keys: vec![],
            parameters: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn missing_table_is_not_found() {
        let catalog = InMemoryCatalog::new();
        catalog.insert_database("analytics").unwrap();
        let err = catalog.get_table("analytics", "events").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_twice_reports_already_exists() {
        let catalog = InMemoryCatalog::new();
        catalog.create_database(Database::new("analytics")).await.unwrap();
        let err = catalog
            .create_database(Database::new("analytics"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(catalog.write_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn get_tables_pages_through_results() {
        let catalog = InMemoryCatalog::with_page_size(2);
        for name in ["a", "b", "c"] {
            catalog.insert_table(table("analytics", name)).unwrap();
        }

        let first = catalog.get_tables("analytics", None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        let token = first.next_token.expect("second page");

        let second = catalog.get_tables("analytics", Some(&token)).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].name, "c");
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn delete_table_drops_partitions() {
        let catalog = InMemoryCatalog::new();
        catalog.insert_table(table("analytics", "events")).unwrap();
        catalog
            .insert_partition(
                "analytics",
                "events",
                Partition {
                    values: vec!["2024-01-01".into()],
                    storage: StorageDescriptor::default(),
                    parameters: BTreeMap::new(),
                },
            )
            .unwrap();

        catalog.delete_table("analytics", "events").await.unwrap();

        assert!(catalog.table("analytics", "events").unwrap().is_none());
        assert!(catalog.partitions("analytics", "events").unwrap().is_empty());
    }
}
