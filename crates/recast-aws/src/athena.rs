//! Amazon Athena implementation of [`QueryService`].

use async_trait::async_trait;
use aws_sdk_athena::types as athena;
use aws_sdk_athena::Client;

use recast_query::{
    BatchExecutions, QueryError, QueryExecution, QueryService, QueryState, QueryStatistics, Result, ResultPage,
    StartQueryRequest, UnprocessedExecution, WorkGroup, WorkGroupConfig, WorkGroupState,
};

use crate::fault::query_error;

/// Execution ids per `BatchGetQueryExecution` call.
pub const BATCH_GET_LIMIT: usize = 50;

/// Athena client.
#[derive(Debug, Clone)]
pub struct AthenaQueryService {
    client: Client,
}

impl AthenaQueryService {
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

fn non_negative(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

/// Converts an Athena execution. Unknown states are reported as failed.
#[must_use]
pub fn execution_from_athena(execution: &athena::QueryExecution) -> QueryExecution {
    let status = execution.status();
    let state = status
        .and_then(athena::QueryExecutionStatus::state)
        .map_or(QueryState::Pending, |state| {
            state.as_str().parse().unwrap_or(QueryState::Failed)
        });
    let statistics = execution.statistics();

    QueryExecution {
        id: execution.query_execution_id().unwrap_or_default().to_string(),
        query: execution.query().map(str::to_string),
        database: execution
            .query_execution_context()
            .and_then(athena::QueryExecutionContext::database)
            .map(str::to_string),
        state,
        state_change_reason: status
            .and_then(athena::QueryExecutionStatus::state_change_reason)
            .map(str::to_string),
        result_location: execution
            .result_configuration()
            .and_then(athena::ResultConfiguration::output_location)
            .map(str::to_string),
        workgroup: execution.work_group().map(str::to_string),
        statistics: QueryStatistics {
            runtime_ms: non_negative(statistics.and_then(athena::QueryExecutionStatistics::engine_execution_time_in_millis)),
            bytes_scanned: non_negative(statistics.and_then(athena::QueryExecutionStatistics::data_scanned_in_bytes)),
        },
    }
}

fn unprocessed_from_athena(unprocessed: &athena::UnprocessedQueryExecutionId) -> UnprocessedExecution {
    UnprocessedExecution {
        id: unprocessed.query_execution_id().unwrap_or_default().to_string(),
        error_code: unprocessed.error_code().map(str::to_string),
        error_message: unprocessed.error_message().map(str::to_string),
    }
}

/// Converts one page of Athena results.
#[must_use]
pub fn page_from_athena(result_set: Option<&athena::ResultSet>, next_token: Option<&str>) -> ResultPage {
    let Some(result_set) = result_set else {
        return ResultPage {
            next_token: next_token.map(str::to_string),
            ..ResultPage::default()
        };
    };
    ResultPage {
        column_names: result_set
            .result_set_metadata()
            .map(|metadata| {
                metadata
                    .column_info()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect()
            })
            .unwrap_or_default(),
        rows: result_set
            .rows()
            .iter()
            .map(|row| {
                row.data()
                    .iter()
                    .map(|datum| datum.var_char_value().map(str::to_string))
                    .collect()
            })
            .collect(),
        next_token: next_token.map(str::to_string),
    }
}

fn workgroup_configuration(config: &WorkGroupConfig) -> Result<athena::WorkGroupConfiguration> {
    let encryption = athena::EncryptionConfiguration::builder()
        .encryption_option(athena::EncryptionOption::from(config.encryption_option.as_str()))
        .build()
        .map_err(|e| QueryError::service_with_source(format!("invalid workgroup {}", config.name), e))?;
    Ok(athena::WorkGroupConfiguration::builder()
        .result_configuration(
            athena::ResultConfiguration::builder()
                .output_location(&config.output_location)
                .encryption_configuration(encryption)
                .build(),
        )
        .enforce_work_group_configuration(config.enforce_configuration)
        .publish_cloud_watch_metrics_enabled(config.publish_metrics)
        .build())
}

#[async_trait]
impl QueryService for AthenaQueryService {
    async fn start_query_execution(&self, request: StartQueryRequest) -> Result<String> {
        let result_configuration = request
            .destination
            .result_location
            .as_ref()
            .map(|location| athena::ResultConfiguration::builder().output_location(location).build());
        let output = self
            .client
            .start_query_execution()
            .query_string(&request.query)
            .query_execution_context(
                athena::QueryExecutionContext::builder()
                    .database(&request.database)
                    .build(),
            )
            .set_result_configuration(result_configuration)
            .set_work_group(request.destination.workgroup.clone())
            .send()
            .await
            .map_err(|e| query_error(e, &request.database))?;
        output
            .query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| QueryError::service("athena returned no query execution id"))
    }

    async fn get_query_execution(&self, id: &str) -> Result<QueryExecution> {
        let output = self
            .client
            .get_query_execution()
            .query_execution_id(id)
            .send()
            .await
            .map_err(|e| query_error(e, id))?;
        output
            .query_execution()
            .map(execution_from_athena)
            .ok_or_else(|| QueryError::NotFound { id: id.to_string() })
    }

    async fn batch_get_query_execution(&self, ids: &[String]) -> Result<BatchExecutions> {
        let mut batch = BatchExecutions::default();
        for chunk in ids.chunks(BATCH_GET_LIMIT) {
            let output = self
                .client
                .batch_get_query_execution()
                .set_query_execution_ids(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| query_error(e, &chunk.join(",")))?;
            batch
                .found
                .extend(output.query_executions().iter().map(execution_from_athena));
            batch
                .unprocessed
                .extend(output.unprocessed_query_execution_ids().iter().map(unprocessed_from_athena));
        }
        Ok(batch)
    }

    async fn get_query_results(&self, id: &str, page_token: Option<&str>) -> Result<ResultPage> {
        let output = self
            .client
            .get_query_results()
            .query_execution_id(id)
            .set_next_token(page_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| query_error(e, id))?;
        Ok(page_from_athena(output.result_set(), output.next_token()))
    }

    async fn stop_query_execution(&self, id: &str) -> Result<()> {
        self.client
            .stop_query_execution()
            .query_execution_id(id)
            .send()
            .await
            .map_err(|e| query_error(e, id))?;
        Ok(())
    }

    async fn get_work_group(&self, name: &str) -> Result<Option<WorkGroup>> {
        let output = match self.client.get_work_group().work_group(name).send().await {
            Ok(output) => output,
            Err(err) => {
                return match query_error(err, name) {
                    QueryError::NotFound { .. } => Ok(None),
                    other => Err(other),
                };
            }
        };
        Ok(output.work_group().map(|workgroup| WorkGroup {
            name: workgroup.name().to_string(),
            state: match workgroup.state() {
                Some(athena::WorkGroupState::Enabled) => WorkGroupState::Enabled,
                _ => WorkGroupState::Disabled,
            },
        }))
    }

    async fn create_work_group(&self, config: WorkGroupConfig) -> Result<()> {
        self.client
            .create_work_group()
            .name(&config.name)
            .description(&config.description)
            .configuration(workgroup_configuration(&config)?)
            .send()
            .await
            .map_err(|e| query_error(e, &config.name))?;
        tracing::info!(workgroup = %config.name, "created workgroup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    fn execution(state: athena::QueryExecutionState) -> athena::QueryExecution {
        athena::QueryExecution::builder()
            .query_execution_id("q-1")
            .query("select 1")
            .query_execution_context(athena::QueryExecutionContext::builder().database("raw").build())
            .status(
                athena::QueryExecutionStatus::builder()
                    .state(state)
                    .state_change_reason("because")
                    .build(),
            )
            .result_configuration(
                athena::ResultConfiguration::builder()
                    .output_location("s3://results/q-1.csv")
                    .build(),
            )
            .statistics(
                athena::QueryExecutionStatistics::builder()
                    .data_scanned_in_bytes(2048)
                    .engine_execution_time_in_millis(1500)
                    .build(),
            )
            .build()
    }

    #[test]
    fn queued_executions_are_pending() {
        let converted = execution_from_athena(&execution(athena::QueryExecutionState::Queued));
        assert_eq!(converted.state, QueryState::Pending);
        assert_eq!(converted.id, "q-1");
        assert_eq!(converted.database.as_deref(), Some("raw"));
        assert_eq!(converted.result_location.as_deref(), Some("s3://results/q-1.csv"));
        assert_eq!(converted.statistics.bytes_scanned, Some(2048));
        assert_eq!(converted.statistics.runtime_ms, Some(1500));
    }

    #[test]
    fn terminal_states_map_one_to_one() {
        for (state, expected) in [
            (athena::QueryExecutionState::Running, QueryState::Running),
            (athena::QueryExecutionState::Succeeded, QueryState::Succeeded),
            (athena::QueryExecutionState::Failed, QueryState::Failed),
            (athena::QueryExecutionState::Cancelled, QueryState::Cancelled),
        ] {
            assert_eq!(execution_from_athena(&execution(state)).state, expected);
        }
    }

    #[test]
    fn result_pages_keep_nulls() {
        let result_set = athena::ResultSet::builder()
            .result_set_metadata(
                athena::ResultSetMetadata::builder()
                    .column_info(
                        athena::ColumnInfo::builder()
                            .name("partition")
                            .r#type("varchar")
                            .build()
                            .unwrap(),
                    )
                    .build(),
            )
            .rows(
                athena::Row::builder()
                    .data(athena::Datum::builder().var_char_value("partition").build())
                    .build(),
            )
            .rows(athena::Row::builder().data(athena::Datum::builder().build()).build())
            .build();

        let page = page_from_athena(Some(&result_set), Some("next"));
        assert_eq!(page.column_names, vec!["partition"]);
        assert_eq!(page.rows, vec![vec![Some("partition".to_string())], vec![None]]);
        assert_eq!(page.next_token.as_deref(), Some("next"));
    }
}
