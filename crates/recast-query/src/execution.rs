//! Query executions as reported by the query service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Informational scan cost per TiB.
pub const COST_PER_TIB: f64 = 5.0;

const TIB: f64 = 1024.0 * 1024.0 * 1024.0 * 1024.0;

/// Returns the informational cost of scanning `bytes`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn scan_cost(bytes: u64) -> f64 {
    bytes as f64 * COST_PER_TIB / TIB
}

/// Lifecycle state of a query execution.
///
/// ```text
/// PENDING ──► RUNNING ──► SUCCEEDED
///    │           ├──────► FAILED
///    └───────────┴──────► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    /// Accepted or queued, not yet running.
    #[serde(alias = "QUEUED")]
    Pending,
    /// Running.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Cancelled before finishing.
    Cancelled,
}

impl QueryState {
    /// Returns true for `SUCCEEDED`, `FAILED` and `CANCELLED`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Service wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryState {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" | "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(QueryError::service(format!("unknown query state '{other}'"))),
        }
    }
}

/// Execution statistics. Absent fields were not reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatistics {
    /// Engine execution time in milliseconds.
    pub runtime_ms: Option<u64>,
    /// Bytes scanned.
    pub bytes_scanned: Option<u64>,
}

/// Status of one query execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExecution {
    /// Execution id.
    pub id: String,
    /// SQL text, when reported.
    pub query: Option<String>,
    /// Database the query ran against.
    pub database: Option<String>,
    /// Current state.
    pub state: QueryState,
    /// Why the state last changed, usually the error message.
    pub state_change_reason: Option<String>,
    /// Object storage URI of the result output.
    pub result_location: Option<String>,
    /// Workgroup the query ran in.
    pub workgroup: Option<String>,
    /// Execution statistics.
    #[serde(default)]
    pub statistics: QueryStatistics,
}

impl QueryExecution {
    /// Creates an execution record in the given state with nothing else known.
    #[must_use]
    pub fn new(id: impl Into<String>, state: QueryState) -> Self {
        Self {
            id: id.into(),
            query: None,
            database: None,
            state,
            state_change_reason: None,
            result_location: None,
            workgroup: None,
            statistics: QueryStatistics::default(),
        }
    }

    /// Status recorded for an id the service could not process.
    #[must_use]
    pub fn unprocessed(id: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            state_change_reason: reason,
            ..Self::new(id, QueryState::Failed)
        }
    }

    /// Returns true once the execution can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Bytes scanned, or zero when not reported.
    #[must_use]
    pub fn bytes_scanned(&self) -> u64 {
        self.statistics.bytes_scanned.unwrap_or(0)
    }

    /// Informational cost of this execution.
    #[must_use]
    pub fn cost(&self) -> f64 {
        scan_cost(self.bytes_scanned())
    }
}
