//! The remote query service boundary.

use async_trait::async_trait;

use crate::error::Result;
use crate::execution::QueryExecution;

/// Where query output goes: an explicit result location, a workgroup, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDestination {
    /// Object storage URI for query output.
    pub result_location: Option<String>,
    /// Workgroup whose configuration supplies the output location.
    pub workgroup: Option<String>,
}

impl QueryDestination {
    /// Creates a destination.
    #[must_use]
    pub const fn new(result_location: Option<String>, workgroup: Option<String>) -> Self {
        Self {
            result_location,
            workgroup,
        }
    }

    /// Output to an explicit result location.
    #[must_use]
    pub fn location(result_location: impl Into<String>) -> Self {
        Self::new(Some(result_location.into()), None)
    }

    /// Output through a workgroup.
    #[must_use]
    pub fn workgroup(workgroup: impl Into<String>) -> Self {
        Self::new(None, Some(workgroup.into()))
    }

    /// Checks that at least one destination is set.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when neither is given.
    pub fn validate(&self) -> recast_core::Result<()> {
        if self.result_location.is_none() && self.workgroup.is_none() {
            return Err(recast_core::Error::configuration(
                "missing output location: provide a query result location and/or a workgroup",
            ));
        }
        Ok(())
    }
}

/// A statement submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartQueryRequest {
    /// Database context.
    pub database: String,
    /// SQL text.
    pub query: String,
    /// Output destination.
    pub destination: QueryDestination,
}

/// An id the batch lookup could not process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnprocessedExecution {
    /// Execution id.
    pub id: String,
    /// Service error code.
    pub error_code: Option<String>,
    /// Service error message.
    pub error_message: Option<String>,
}

/// Result of a batched status lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchExecutions {
    /// Executions found.
    pub found: Vec<QueryExecution>,
    /// Ids that could not be processed.
    pub unprocessed: Vec<UnprocessedExecution>,
}

/// One page of query results as returned by the service.
///
/// The first page starts with the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPage {
    /// Result column names.
    pub column_names: Vec<String>,
    /// Rows of nullable values.
    pub rows: Vec<Vec<Option<String>>>,
    /// Token for the next page.
    pub next_token: Option<String>,
}

/// Whether a workgroup accepts queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkGroupState {
    /// Accepts queries.
    Enabled,
    /// Rejects queries.
    Disabled,
}

/// Configuration of a new workgroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkGroupConfig {
    /// Workgroup name.
    pub name: String,
    /// Description, defaulting to the name.
    pub description: String,
    /// Default output location.
    pub output_location: String,
    /// Result encryption option.
    pub encryption_option: String,
    /// Whether the workgroup overrides client-side settings.
    pub enforce_configuration: bool,
    /// Whether the workgroup publishes metrics.
    pub publish_metrics: bool,
}

impl WorkGroupConfig {
    /// Creates a configuration with `SSE_S3` encryption and metrics enabled.
    #[must_use]
    pub fn new(name: impl Into<String>, output_location: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            output_location: output_location.into(),
            encryption_option: "SSE_S3".to_string(),
            enforce_configuration: false,
            publish_metrics: true,
        }
    }

    /// Sets the description. Empty descriptions keep the default.
    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        if let Some(description) = description.filter(|d| !d.is_empty()) {
            self.description = description;
        }
        self
    }
}

/// A workgroup as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkGroup {
    /// Workgroup name.
    pub name: String,
    /// Current state.
    pub state: WorkGroupState,
}

/// Remote query service API.
#[async_trait]
pub trait QueryService: Send + Sync + 'static {
    /// Submits a statement and returns its execution id.
    async fn start_query_execution(&self, request: StartQueryRequest) -> Result<String>;

    /// Fetches the status of one execution.
    async fn get_query_execution(&self, id: &str) -> Result<QueryExecution>;

    /// Fetches the status of many executions in one call.
    async fn batch_get_query_execution(&self, ids: &[String]) -> Result<BatchExecutions>;

    /// Fetches one page of results.
    async fn get_query_results(&self, id: &str, page_token: Option<&str>) -> Result<ResultPage>;

    /// Requests cancellation of an execution.
    async fn stop_query_execution(&self, id: &str) -> Result<()>;

    /// Fetches a workgroup, `None` if it does not exist.
    async fn get_work_group(&self, name: &str) -> Result<Option<WorkGroup>>;

    /// Creates a workgroup. Fails with `AlreadyExists` if present.
    async fn create_work_group(&self, config: WorkGroupConfig) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_requires_location_or_workgroup() {
        let err = QueryDestination::default().validate().unwrap_err();
        assert!(matches!(err, recast_core::Error::Configuration(_)));
        assert!(QueryDestination::location("s3://results/").validate().is_ok());
        assert!(QueryDestination::workgroup("etl").validate().is_ok());
    }

    #[test]
    fn workgroup_description_defaults_to_name() {
        let config = WorkGroupConfig::new("etl", "s3://results/").with_description(Some(String::new()));
        assert_eq!(config.description, "etl");
        assert_eq!(config.encryption_option, "SSE_S3");
    }
}
