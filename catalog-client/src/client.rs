use tracing::instrument;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::{authenticate, build_http_client, execute_with_retry, handle_response};
use crate::models::tables::{SyncTableRequest, SyncTableResponse};

/// An HTTP client for the catalog API.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http_client: reqwest::Client,
    config: ClientConfig,
    base_url: Url,
}

impl CatalogClient {
    /// Create a new client from [ClientConfig].
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(&config)?,
            base_url: config.endpoint.clone(),
            config,
        })
    }

    /// Create from existing reqwest Client.
    pub fn with_http_client(http_client: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            base_url: config.endpoint.clone(),
            http_client,
            config,
        }
    }

    /// Register or refresh a table.
    #[instrument(skip(self), fields(database = %request.database, table = %request.table))]
    pub async fn sync_table(&self, request: &SyncTableRequest) -> Result<SyncTableResponse> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                Error::InvalidConfiguration(format!("'{}' cannot be a base URL", self.base_url))
            })?
            .pop_if_empty()
            .extend(request.path_segments());

        let response = execute_with_retry(&self.config, || {
            authenticate(self.http_client.post(url.clone()), &self.config)
                .json(request)
                .send()
        })
        .await?;

        handle_response(response).await
    }
}
