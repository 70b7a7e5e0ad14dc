//! # recast-aws
//!
//! AWS implementations of the recast service boundaries.
//!
//! - [`GlueCatalog`]: the Glue Data Catalog as a
//!   [`CatalogService`](recast_catalog::CatalogService)
//! - [`AthenaQueryService`]: Athena as a
//!   [`QueryService`](recast_query::QueryService)
//! - [`S3Backend`]: S3 object storage through `object_store`
//!
//! [`AwsServices::from_env`] wires all three from the standard AWS
//! environment. Object transfers are wrapped in a
//! [`RetryingBackend`] with the transfer retry policy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod athena;
pub mod fault;
pub mod glue;
pub mod s3;

use std::sync::Arc;

use recast_catalog::CatalogClient;
use recast_core::{RetryPolicy, RetryingBackend, StorageBackend};
use recast_query::QueryClient;

pub use athena::AthenaQueryService;
pub use glue::GlueCatalog;
pub use s3::S3Backend;

/// Catalog, query and storage services for one AWS account and region.
#[derive(Clone)]
pub struct AwsServices {
    /// Glue catalog.
    pub catalog: Arc<GlueCatalog>,
    /// Athena query service.
    pub queries: Arc<AthenaQueryService>,
    /// S3 storage with transfer retries.
    pub storage: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for AwsServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsServices")
            .field("catalog", &self.catalog)
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}

impl AwsServices {
    /// Loads the shared AWS configuration (region, credentials) from the
    /// environment and builds every service from it.
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest()).load().await;
        tracing::debug!(region = ?config.region(), "loaded aws configuration");
        Self::from_conf(&config, S3Backend::from_env())
    }

    /// Builds the services from loaded configuration and a storage backend.
    #[must_use]
    pub fn from_conf(config: &aws_config::SdkConfig, storage: S3Backend) -> Self {
        Self {
            catalog: Arc::new(GlueCatalog::from_conf(config)),
            queries: Arc::new(AthenaQueryService::from_conf(config)),
            storage: Arc::new(RetryingBackend::new(Arc::new(storage), RetryPolicy::transfer())),
        }
    }

    /// Catalog client over these services.
    #[must_use]
    pub fn catalog_client(&self) -> CatalogClient {
        CatalogClient::new(self.catalog.clone(), Arc::clone(&self.storage))
    }

    /// Query client over these services.
    #[must_use]
    pub fn query_client(&self) -> QueryClient {
        QueryClient::new(self.queries.clone(), Arc::clone(&self.storage))
    }
}
