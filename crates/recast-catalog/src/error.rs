//! Error types for recast-catalog operations.

use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The database, table or partition does not exist.
    #[error("{entity} not found: {name}")]
    EntityNotFound {
        /// Kind of catalog entity.
        entity: &'static str,
        /// Qualified name of the entity.
        name: String,
    },

    /// The entity was created concurrently or already existed.
    #[error("{entity} already exists: {name}")]
    AlreadyExists {
        /// Kind of catalog entity.
        entity: &'static str,
        /// Qualified name of the entity.
        name: String,
    },

    /// The catalog service throttled the request.
    #[error("catalog throttled: {message}")]
    Throttled {
        /// Service message.
        message: String,
    },

    /// Any other catalog service failure.
    #[error("catalog service error: {message}")]
    Service {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A table has no storage location to read or copy from.
    #[error("table {database}.{table} has no storage location")]
    MissingLocation {
        /// Database name.
        database: String,
        /// Table name.
        table: String,
    },

    /// Error from recast-core (object storage, configuration).
    #[error("core error: {0}")]
    Core(#[from] recast_core::Error),
}

impl CatalogError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, name: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity,
            name: name.into(),
        }
    }

    /// Creates an already-exists error.
    #[must_use]
    pub fn already_exists(entity: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            name: name.into(),
        }
    }

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

    /// Returns true if the error reports a missing entity.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntityNotFound { .. } | Self::Core(recast_core::Error::NotFound { .. })
        )
    }

    /// Returns true if the error reports an existing entity.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
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
}
