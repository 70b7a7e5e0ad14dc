//! In-memory query service implementation for testing.
//!
//! [`InMemoryQueryService`] decides the fate of each submitted statement with
//! a handler that returns a [`ScriptedOutcome`]: how many polls the execution
//! stays pending, its final state, result rows and statistics. Every status
//! poll is timestamped with the tokio clock, so paused-time tests can assert
//! the exact backoff schedule a waiter used.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: Statements are never executed
//! - **Result pages are fixed-size**: Page tokens are offsets

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::time::Instant;
use ulid::Ulid;

use recast_core::MemoryBackend;

use crate::error::{QueryError, Result};
use crate::execution::{QueryExecution, QueryState, QueryStatistics};
use crate::service::{
    BatchExecutions, QueryService, ResultPage, StartQueryRequest, UnprocessedExecution, WorkGroup,
    WorkGroupConfig, WorkGroupState,
};

/// Default number of rows per results page, header included.
pub const DEFAULT_RESULT_PAGE_SIZE: usize = 1000;

/// Decides the outcome of each submitted statement.
pub type QueryHandler = Arc<dyn Fn(&StartQueryRequest) -> ScriptedOutcome + Send + Sync>;

/// Scripted lifecycle of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedOutcome {
    /// State reported once the pending polls are used up.
    pub final_state: QueryState,
    /// Number of status polls that report a non-terminal state.
    pub pending_polls: u32,
    /// Result column names.
    pub column_names: Vec<String>,
    /// Result rows.
    pub rows: Vec<Vec<Option<String>>>,
    /// Bytes scanned reported on completion.
    pub bytes_scanned: Option<u64>,
    /// Engine time reported on completion.
    pub runtime_ms: Option<u64>,
    /// State change reason reported on completion.
    pub reason: Option<String>,
}

impl ScriptedOutcome {
    fn finished(final_state: QueryState) -> Self {
        Self {
            final_state,
            pending_polls: 0,
            column_names: Vec::new(),
            rows: Vec::new(),
            bytes_scanned: None,
            runtime_ms: None,
            reason: None,
        }
    }

    /// Succeeds on the first poll.
    #[must_use]
    pub fn succeeded() -> Self {
        Self::finished(QueryState::Succeeded)
    }

    /// Fails on the first poll with the given reason.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::finished(QueryState::Failed)
        }
    }

    /// Is cancelled on the first poll.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::finished(QueryState::Cancelled)
    }

    /// Stays pending for `polls` polls before finishing.
    #[must_use]
    pub const fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Never finishes.
    #[must_use]
    pub const fn never_finishes(self) -> Self {
        self.with_pending_polls(u32::MAX)
    }

    /// Sets the result set.
    #[must_use]
    pub fn with_rows(mut self, column_names: &[&str], rows: Vec<Vec<Option<String>>>) -> Self {
        self.column_names = column_names.iter().map(|c| (*c).to_string()).collect();
        self.rows = rows;
        self
    }

    /// Sets the execution statistics.
    #[must_use]
    pub const fn with_statistics(mut self, bytes_scanned: u64, runtime_ms: u64) -> Self {
        self.bytes_scanned = Some(bytes_scanned);
        self.runtime_ms = Some(runtime_ms);
        self
    }
}

#[derive(Debug, Clone)]
struct ScriptedExecution {
    request: Option<StartQueryRequest>,
    outcome: ScriptedOutcome,
    result_location: Option<String>,
    polls: Vec<Instant>,
    stopped: bool,
}

impl ScriptedExecution {
    fn status(&self, id: &str) -> QueryExecution {
        let polls = u32::try_from(self.polls.len()).unwrap_or(u32::MAX);
        let (state, finished) = if self.stopped {
            (QueryState::Cancelled, true)
        } else if polls <= self.outcome.pending_polls {
            let state = if polls <= 1 {
                QueryState::Pending
            } else {
                QueryState::Running
            };
            (state, false)
        } else {
            (self.outcome.final_state, true)
        };

        let mut execution = QueryExecution::new(id, state);
        execution.result_location.clone_from(&self.result_location);
        if let Some(request) = &self.request {
            execution.query = Some(request.query.clone());
            execution.database = Some(request.database.clone());
            execution.workgroup.clone_from(&request.destination.workgroup);
        }
        if finished {
            execution.state_change_reason.clone_from(&self.outcome.reason);
            execution.statistics = QueryStatistics {
                runtime_ms: self.outcome.runtime_ms,
                bytes_scanned: self.outcome.bytes_scanned,
            };
        }
        execution
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    executions: BTreeMap<String, ScriptedExecution>,
    submitted: Vec<StartQueryRequest>,
    submitted_ids: Vec<String>,
    unprocessed: BTreeMap<String, String>,
    workgroups: BTreeMap<String, WorkGroupConfig>,
    disabled: Vec<String>,
    stopped: Vec<String>,
}

/// In-memory scripted query service.
pub struct InMemoryQueryService {
    state: RwLock<ServiceState>,
    handler: QueryHandler,
    results_storage: Option<MemoryBackend>,
    page_size: usize,
}

impl std::fmt::Debug for InMemoryQueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueryService")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryQueryService {
    fn default() -> Self {
        Self::new()
    }
}

fn poison_err<T>(_: PoisonError<T>) -> QueryError {
    QueryError::service("query service lock poisoned")
}

fn output_uri(prefix: &str, id: &str) -> String {
    format!("{}/{id}.csv", prefix.trim_end_matches('/'))
}

impl InMemoryQueryService {
    /// Creates a service where every statement succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handler(|_| ScriptedOutcome::succeeded())
    }

    /// Creates a service that scripts each statement with `handler`.
    #[must_use]
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&StartQueryRequest) -> ScriptedOutcome + Send + Sync + 'static,
    {
        Self {
            state: RwLock::new(ServiceState::default()),
            handler: Arc::new(handler),
            results_storage: None,
            page_size: DEFAULT_RESULT_PAGE_SIZE,
        }
    }

    /// Writes a result object for every submission into `storage`.
    #[must_use]
    pub fn with_results_storage(mut self, storage: MemoryBackend) -> Self {
        self.results_storage = Some(storage);
        self
    }

    /// Sets the number of rows per results page, header included.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Seeds an execution with a known id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn register(&self, id: &str, outcome: ScriptedOutcome) -> Result<()> {
        self.state.write().map_err(poison_err)?.executions.insert(
            id.to_string(),
            ScriptedExecution {
                request: None,
                outcome,
                result_location: None,
                polls: Vec::new(),
                stopped: false,
            },
        );
        Ok(())
    }

    /// Makes batch lookups report `id` as unprocessed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn mark_unprocessed(&self, id: &str, message: &str) -> Result<()> {
        self.state
            .write()
            .map_err(poison_err)?
            .unprocessed
            .insert(id.to_string(), message.to_string());
        Ok(())
    }

    /// Seeds a disabled workgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_disabled_work_group(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state
            .workgroups
            .insert(name.to_string(), WorkGroupConfig::new(name, "s3://query-results/"));
        state.disabled.push(name.to_string());
        drop(state);
        Ok(())
    }

    /// Returns every submitted statement, in submission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn submitted(&self) -> Result<Vec<StartQueryRequest>> {
        Ok(self.state.read().map_err(poison_err)?.submitted.clone())
    }

    /// Returns the ids of every submitted statement, in submission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn execution_ids(&self) -> Result<Vec<String>> {
        Ok(self.state.read().map_err(poison_err)?.submitted_ids.clone())
    }

    /// Returns the instants at which `id` was polled.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn polls(&self, id: &str) -> Result<Vec<Instant>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .executions
            .get(id)
            .map(|e| e.polls.clone())
            .unwrap_or_default())
    }

    /// Returns the ids passed to `stop_query_execution`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn stopped(&self) -> Result<Vec<String>> {
        Ok(self.state.read().map_err(poison_err)?.stopped.clone())
    }

    fn poll(state: &mut ServiceState, id: &str) -> Option<QueryExecution> {
        let execution = state.executions.get_mut(id)?;
        execution.polls.push(Instant::now());
        Some(execution.status(id))
    }
}

#[async_trait]
impl QueryService for InMemoryQueryService {
    async fn start_query_execution(&self, request: StartQueryRequest) -> Result<String> {
        let outcome = (self.handler)(&request);
        let id = Ulid::new().to_string();

        let mut state = self.state.write().map_err(poison_err)?;
        let prefix = match (&request.destination.result_location, &request.destination.workgroup) {
            (Some(location), _) => Some(location.clone()),
            (None, Some(workgroup)) => Some(
                state
                    .workgroups
                    .get(workgroup)
                    .map_or_else(|| format!("s3://query-results/{workgroup}/"), |w| w.output_location.clone()),
            ),
            (None, None) => None,
        };
        let result_location = prefix.map(|prefix| output_uri(&prefix, &id));

        state.submitted.push(request.clone());
        state.submitted_ids.push(id.clone());
        state.executions.insert(
            id.clone(),
            ScriptedExecution {
                request: Some(request),
                outcome,
                result_location: result_location.clone(),
                polls: Vec::new(),
                stopped: false,
            },
        );
        drop(state);

        if let (Some(storage), Some(location)) = (&self.results_storage, result_location) {
            storage.put(location, "query output")?;
        }
        Ok(id)
    }

    async fn get_query_execution(&self, id: &str) -> Result<QueryExecution> {
        let mut state = self.state.write().map_err(poison_err)?;
        Self::poll(&mut state, id).ok_or_else(|| QueryError::NotFound { id: id.to_string() })
    }

    async fn batch_get_query_execution(&self, ids: &[String]) -> Result<BatchExecutions> {
        let mut state = self.state.write().map_err(poison_err)?;
        let mut batch = BatchExecutions::default();
        for id in ids {
            if let Some(message) = state.unprocessed.get(id).cloned() {
                batch.unprocessed.push(UnprocessedExecution {
                    id: id.clone(),
                    error_code: Some("INVALID_INPUT".to_string()),
                    error_message: Some(message),
                });
                continue;
            }
            match Self::poll(&mut state, id) {
                Some(execution) => batch.found.push(execution),
                None => batch.unprocessed.push(UnprocessedExecution {
                    id: id.clone(),
                    error_code: Some("NOT_FOUND".to_string()),
                    error_message: Some(format!("query execution {id} was not found")),
                }),
            }
        }
        drop(state);
        Ok(batch)
    }

    async fn get_query_results(&self, id: &str, page_token: Option<&str>) -> Result<ResultPage> {
        let state = self.state.read().map_err(poison_err)?;
        let execution = state
            .executions
            .get(id)
            .ok_or_else(|| QueryError::NotFound { id: id.to_string() })?;

        let outcome = &execution.outcome;
        let header: Vec<Option<String>> = outcome.column_names.iter().cloned().map(Some).collect();
        let all_rows: Vec<Vec<Option<String>>> = std::iter::once(header)
            .chain(outcome.rows.iter().cloned())
            .collect();

        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| QueryError::service(format!("invalid page token '{token}'")))?,
            None => 0,
        };
        let end = start.saturating_add(self.page_size).min(all_rows.len());
        let rows = all_rows.get(start..end).unwrap_or_default().to_vec();

        Ok(ResultPage {
            column_names: outcome.column_names.clone(),
            rows,
            next_token: (end < all_rows.len()).then(|| end.to_string()),
        })
    }

    async fn stop_query_execution(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let execution = state
            .executions
            .get_mut(id)
            .ok_or_else(|| QueryError::NotFound { id: id.to_string() })?;
        execution.stopped = true;
        state.stopped.push(id.to_string());
        drop(state);
        Ok(())
    }

    async fn get_work_group(&self, name: &str) -> Result<Option<WorkGroup>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.workgroups.get(name).map(|config| WorkGroup {
            name: config.name.clone(),
            state: if state.disabled.iter().any(|d| d == name) {
                WorkGroupState::Disabled
            } else {
                WorkGroupState::Enabled
            },
        }))
    }

    async fn create_work_group(&self, config: WorkGroupConfig) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        if state.workgroups.contains_key(&config.name) {
            return Err(QueryError::AlreadyExists { name: config.name });
        }
        state.workgroups.insert(config.name.clone(), config);
        drop(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::QueryDestination;

    fn request(sql: &str) -> StartQueryRequest {
        StartQueryRequest {
            database: "analytics".into(),
            query: sql.into(),
            destination: QueryDestination::location("s3://results/"),
        }
    }

    #[tokio::test]
    async fn execution_walks_through_pending_states() {
        let service = InMemoryQueryService::with_handler(|_| {
            ScriptedOutcome::succeeded()
                .with_pending_polls(2)
                .with_statistics(2048, 15)
        });
        let id = service.start_query_execution(request("select 1")).await.unwrap();

        let first = service.get_query_execution(&id).await.unwrap();
        assert_eq!(first.state, QueryState::Pending);
        let second = service.get_query_execution(&id).await.unwrap();
        assert_eq!(second.state, QueryState::Running);
        let third = service.get_query_execution(&id).await.unwrap();
        assert_eq!(third.state, QueryState::Succeeded);
        assert_eq!(third.bytes_scanned(), 2048);
        assert_eq!(
            third.result_location.as_deref(),
            Some(format!("s3://results/{id}.csv").as_str())
        );
        assert_eq!(service.polls(&id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn first_results_page_starts_with_header() {
        let service = InMemoryQueryService::with_handler(|_| {
            ScriptedOutcome::succeeded().with_rows(&["dt"], vec![vec![Some("dt=2024-01-01".into())]])
        })
        .with_page_size(1);
        let id = service.start_query_execution(request("show partitions a.b")).await.unwrap();

        let first = service.get_query_results(&id, None).await.unwrap();
        assert_eq!(first.rows, vec![vec![Some("dt".to_string())]]);
        let token = first.next_token.expect("second page");
        let second = service.get_query_results(&id, Some(&token)).await.unwrap();
        assert_eq!(second.rows, vec![vec![Some("dt=2024-01-01".to_string())]]);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn stopped_execution_reports_cancelled() {
        let service = InMemoryQueryService::with_handler(|_| ScriptedOutcome::succeeded().never_finishes());
        let id = service.start_query_execution(request("select 1")).await.unwrap();
        service.stop_query_execution(&id).await.unwrap();
        let status = service.get_query_execution(&id).await.unwrap();
        assert_eq!(status.state, QueryState::Cancelled);
    }
}
