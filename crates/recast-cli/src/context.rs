//! Clients and settings shared by every command.

use recast_aws::AwsServices;
use recast_catalog::CatalogClient;
use recast_query::{QueryClient, QueryDestination};

use crate::Settings;

/// What a command runs against.
#[derive(Debug, Clone)]
pub struct Context {
    /// Catalog client.
    pub catalog: CatalogClient,
    /// Query client, polling with the configured wait options.
    pub query: QueryClient,
    /// Effective settings.
    pub settings: Settings,
}

impl Context {
    /// Creates a context over the given clients.
    #[must_use]
    pub fn new(catalog: CatalogClient, query: QueryClient, settings: Settings) -> Self {
        let query = query.with_wait_options(settings.convert.wait_options());
        Self {
            catalog,
            query,
            settings,
        }
    }

    /// Creates a context over AWS Glue, Athena and S3.
    pub async fn from_aws(settings: Settings) -> Self {
        let services = AwsServices::from_env().await;
        Self::new(services.catalog_client(), services.query_client(), settings)
    }

    /// Where query output goes.
    #[must_use]
    pub fn destination(&self) -> QueryDestination {
        self.settings.convert.destination()
    }
}
