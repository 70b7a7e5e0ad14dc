//! Error types for recast-query operations.

use std::time::Duration;

use thiserror::Error;

use crate::execution::QueryExecution;

/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors that can occur while running queries.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query reached a terminal state other than `SUCCEEDED`.
    #[error(
        "query {} finished in state {}: {}",
        .execution.id,
        .execution.state,
        .execution.state_change_reason.as_deref().unwrap_or("no reason given")
    )]
    QueryFailed {
        /// The full final status, for diagnostics.
        execution: Box<QueryExecution>,
    },

    /// Waiting would exceed the caller's deadline while queries still run.
    #[error("timed out after waiting {waited:?}; still running: {pending:?}")]
    Timeout {
        /// Total time slept before giving up.
        waited: Duration,
        /// Executions that were still pending.
        pending: Vec<String>,
    },

    /// The execution id is unknown to the service.
    #[error("query execution not found: {id}")]
    NotFound {
        /// Execution id.
        id: String,
    },

    /// A named resource (workgroup) already exists.
    #[error("already exists: {name}")]
    AlreadyExists {
        /// Resource name.
        name: String,
    },

    /// The query service throttled the request.
    #[error("query service throttled: {message}")]
    Throttled {
        /// Service message.
        message: String,
    },

    /// Any other query service failure.
    #[error("query service error: {message}")]
    Service {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error from recast-core (configuration, object storage).
    #[error("core error: {0}")]
    Core(#[from] recast_core::Error),
}

impl QueryError {
    /// Creates a service error without a source.
    #[must_use]
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a service error with a source cause.
    #[must_use]
    pub fn service_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Service {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if retrying the call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Throttled { .. } => true,
            Self::Core(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// The failed execution, if this is a query failure.
    #[must_use]
    pub fn execution(&self) -> Option<&QueryExecution> {
        match self {
            Self::QueryFailed { execution } => Some(execution),
            _ => None,
        }
    }
}
