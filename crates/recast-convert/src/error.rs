//! Error types for recast-convert operations.

use thiserror::Error;

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Errors that can occur while converting tables.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Invalid caller input, such as bucket columns without a bucket count.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A catalog operation failed.
    #[error(transparent)]
    Catalog(#[from] recast_catalog::CatalogError),

    /// A query failed, timed out or could not be submitted.
    #[error(transparent)]
    Query(#[from] recast_query::QueryError),

    /// Error from recast-core.
    #[error(transparent)]
    Core(#[from] recast_core::Error),

    /// A conversion task panicked or was aborted.
    #[error("conversion task for table {table} did not complete: {message}")]
    TaskPanicked {
        /// Table the task was converting.
        table: String,
        /// Join error description.
        message: String,
    },
}

impl ConvertError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true for invalid caller input, whichever layer reported it.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Core(recast_core::Error::Configuration(_))
                | Self::Query(recast_query::QueryError::Core(recast_core::Error::Configuration(_)))
        )
    }

    /// The failed execution, if a query reached a non-success terminal state.
    #[must_use]
    pub fn failed_execution(&self) -> Option<&recast_query::QueryExecution> {
        match self {
            Self::Query(err) => err.execution(),
            _ => None,
        }
    }
}
