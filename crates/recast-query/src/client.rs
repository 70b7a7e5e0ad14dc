//! Query client: submission, status, results and the statements built on them.

use std::sync::Arc;

use recast_core::StorageBackend;

use crate::error::{QueryError, Result};
use crate::execution::{QueryExecution, QueryState};
use crate::results::{QueryResults, Row};
use crate::service::{QueryDestination, QueryService, StartQueryRequest, WorkGroupConfig, WorkGroupState};
use crate::waiter::{QueryWaiter, WaitOptions};

/// Client for the external query service.
#[derive(Clone)]
pub struct QueryClient {
    service: Arc<dyn QueryService>,
    storage: Arc<dyn StorageBackend>,
    wait_options: WaitOptions,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("wait_options", &self.wait_options)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    /// Creates a client with default wait options.
    ///
    /// `storage` is used to delete query output objects.
    #[must_use]
    pub fn new(service: Arc<dyn QueryService>, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            service,
            storage,
            wait_options: WaitOptions::default(),
        }
    }

    /// Sets the options used by [`run`](Self::run).
    #[must_use]
    pub const fn with_wait_options(mut self, wait_options: WaitOptions) -> Self {
        self.wait_options = wait_options;
        self
    }

    /// Options used by [`run`](Self::run).
    #[must_use]
    pub const fn wait_options(&self) -> &WaitOptions {
        &self.wait_options
    }

    /// A waiter over the same service.
    #[must_use]
    pub fn waiter(&self) -> QueryWaiter {
        QueryWaiter::new(self.service.clone())
    }

    /// Submits a statement and returns its execution id.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `destination` has neither a result
    /// location nor a workgroup.
    pub async fn submit(&self, database: &str, sql: &str, destination: &QueryDestination) -> Result<String> {
        destination.validate()?;
        let id = self
            .service
            .start_query_execution(StartQueryRequest {
                database: database.to_string(),
                query: sql.to_string(),
                destination: destination.clone(),
            })
            .await?;
        tracing::debug!(database, execution_id = %id, "submitted query");
        Ok(id)
    }

    /// Fetches the current status of an execution.
    pub async fn status(&self, execution_id: &str) -> Result<QueryExecution> {
        self.service.get_query_execution(execution_id).await
    }

    /// Returns a lazy pager over the rows of an execution.
    #[must_use]
    pub fn results(&self, execution_id: &str, max_rows: Option<usize>, delete_output: bool) -> QueryResults {
        QueryResults::new(
            self.service.clone(),
            self.storage.clone(),
            execution_id,
            max_rows,
            delete_output,
        )
    }

    /// Reads every row of an execution.
    pub async fn collect_results(
        &self,
        execution_id: &str,
        max_rows: Option<usize>,
        delete_output: bool,
    ) -> Result<Vec<Row>> {
        self.results(execution_id, max_rows, delete_output).collect().await
    }

    /// Submits a statement, waits for it and logs its statistics.
    ///
    /// The output object is deleted when `delete_output` is set, whatever the
    /// outcome. A failed deletion is only an error for a successful query;
    /// otherwise it is logged and the query failure is returned.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::QueryFailed`] if the query did not succeed.
    pub async fn run(
        &self,
        database: &str,
        sql: &str,
        destination: &QueryDestination,
        delete_output: bool,
    ) -> Result<QueryExecution> {
        let id = self.submit(database, sql, destination).await?;
        let execution = self.waiter().wait_for(&id, &self.wait_options).await?;

        tracing::info!(
            database,
            execution_id = %execution.id,
            state = %execution.state,
            runtime_ms = ?execution.statistics.runtime_ms,
            bytes_scanned = ?execution.statistics.bytes_scanned,
            cost = execution.cost(),
            "query finished"
        );

        let succeeded = execution.state == QueryState::Succeeded;
        if delete_output {
            if let Some(location) = &execution.result_location {
                match self.storage.delete_prefix(location).await {
                    Ok(()) => {}
                    Err(err) if succeeded => return Err(err.into()),
                    Err(err) => {
                        tracing::warn!(
                            execution_id = %execution.id,
                            location = %location,
                            error = %err,
                            "failed to delete output of failed query"
                        );
                    }
                }
            }
        }

        if !succeeded {
            return Err(QueryError::QueryFailed {
                execution: Box::new(execution),
            });
        }
        Ok(execution)
    }

    /// Requests cancellation of a running execution.
    pub async fn cancel(&self, execution_id: &str) -> Result<()> {
        self.service.stop_query_execution(execution_id).await?;
        tracing::info!(execution_id, "requested query cancellation");
        Ok(())
    }

    /// Lists a table's partitions as the query engine sees them
    /// (`dt=2024-01-01/region=eu`).
    pub async fn show_partitions(
        &self,
        database: &str,
        table: &str,
        destination: &QueryDestination,
    ) -> Result<Vec<String>> {
        let sql = format!("show partitions {database}.{table}");
        let execution = self.run(database, &sql, destination, false).await?;
        let rows = self.collect_results(&execution.id, None, true).await?;
        Ok(rows
            .into_iter()
            .flat_map(|row| row.into_values().flatten())
            .collect())
    }

    /// Asks the query engine to discover partitions from storage.
    pub async fn repair_partitions(
        &self,
        database: &str,
        table: &str,
        destination: &QueryDestination,
    ) -> Result<QueryExecution> {
        let sql = format!("msck repair table {database}.{table}");
        self.run(database, &sql, destination, true).await
    }

    /// Creates a workgroup unless an enabled one already exists.
    ///
    /// Returns true if this call created it. Losing a creation race is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns a service error if the workgroup is still missing or disabled
    /// afterwards.
    pub async fn ensure_workgroup(
        &self,
        name: &str,
        output_location: &str,
        description: Option<String>,
    ) -> Result<bool> {
        if self.workgroup_enabled(name).await? {
            return Ok(false);
        }

        let config = WorkGroupConfig::new(name, output_location).with_description(description);
        let created = match self.service.create_work_group(config).await {
            Ok(()) => true,
            Err(QueryError::AlreadyExists { .. }) => false,
            Err(err) => return Err(err),
        };

        if !self.workgroup_enabled(name).await? {
            return Err(QueryError::service(format!("failed to create workgroup {name}")));
        }
        if created {
            tracing::info!(workgroup = name, output_location, "created workgroup");
        }
        Ok(created)
    }

    async fn workgroup_enabled(&self, name: &str) -> Result<bool> {
        Ok(self
            .service
            .get_work_group(name)
            .await?
            .is_some_and(|w| w.name == name && w.state == WorkGroupState::Enabled))
    }
}
