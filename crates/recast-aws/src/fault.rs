//! Classification of AWS service errors.
//!
//! The service boundaries only care about four outcomes of a failed call:
//! the entity is missing, it already exists, the caller was throttled, or
//! something else went wrong. Glue reports the first two with dedicated
//! error codes; Athena folds both into `InvalidRequestException` and only
//! the message tells them apart.

use aws_sdk_glue::error::{DisplayErrorContext, ProvideErrorMetadata};

use recast_catalog::CatalogError;
use recast_query::QueryError;

const THROTTLING_CODES: &[&str] = &[
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "SlowDown",
];

/// What a failed service call means to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The addressed entity does not exist.
    NotFound,
    /// The entity to create exists.
    AlreadyExists,
    /// The request was rate limited.
    Throttled,
    /// Anything else.
    Other,
}

/// Classifies an error from its code and message.
#[must_use]
pub fn classify(code: Option<&str>, message: Option<&str>) -> Fault {
    let message = message.unwrap_or_default();
    match code {
        Some("EntityNotFoundException") => Fault::NotFound,
        Some("AlreadyExistsException") => Fault::AlreadyExists,
        Some(code) if THROTTLING_CODES.contains(&code) => Fault::Throttled,
        Some("InvalidRequestException") if message.contains("is not found") => Fault::NotFound,
        Some("InvalidRequestException") if message.contains("is already created") => Fault::AlreadyExists,
        _ => Fault::Other,
    }
}

/// Maps a Glue SDK error on `entity` named `name` to a catalog error.
pub(crate) fn catalog_error<E>(err: E, entity: &'static str, name: &str) -> CatalogError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match classify(err.code(), err.message()) {
        Fault::NotFound => CatalogError::not_found(entity, name),
        Fault::AlreadyExists => CatalogError::already_exists(entity, name),
        Fault::Throttled => CatalogError::Throttled {
            message: DisplayErrorContext(&err).to_string(),
        },
        Fault::Other => CatalogError::service_with_source(format!("glue call on {entity} {name} failed"), err),
    }
}

/// Maps an Athena SDK error about `subject` to a query error.
pub(crate) fn query_error<E>(err: E, subject: &str) -> QueryError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match classify(err.code(), err.message()) {
        Fault::NotFound => QueryError::NotFound {
            id: subject.to_string(),
        },
        Fault::AlreadyExists => QueryError::AlreadyExists {
            name: subject.to_string(),
        },
        Fault::Throttled => QueryError::Throttled {
            message: DisplayErrorContext(&err).to_string(),
        },
        Fault::Other => QueryError::service_with_source(format!("athena call for {subject} failed"), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glue_codes() {
        assert_eq!(classify(Some("EntityNotFoundException"), None), Fault::NotFound);
        assert_eq!(classify(Some("AlreadyExistsException"), Some("x")), Fault::AlreadyExists);
        assert_eq!(classify(Some("ThrottlingException"), None), Fault::Throttled);
        assert_eq!(classify(Some("InternalServiceException"), None), Fault::Other);
    }

    #[test]
    fn athena_invalid_requests_are_split_by_message() {
        assert_eq!(
            classify(Some("InvalidRequestException"), Some("WorkGroup etl is not found.")),
            Fault::NotFound
        );
        assert_eq!(
            classify(Some("InvalidRequestException"), Some("WorkGroup etl is already created")),
            Fault::AlreadyExists
        );
        assert_eq!(
            classify(Some("InvalidRequestException"), Some("line 1:8: mismatched input")),
            Fault::Other
        );
        assert_eq!(classify(Some("TooManyRequestsException"), None), Fault::Throttled);
        assert_eq!(classify(None, None), Fault::Other);
    }
}
