//! A [`CatalogPublisher`] that registers snaptable tables with a REST catalog after each commit.
//!
//! Every sync builds a [`CatalogClient`] from the endpoint and credentials carried by the
//! [`SyncDescriptor`], so one publisher serves writes that target different catalogs.
//!
//! The data source API is synchronous. When called from inside a multi-threaded tokio runtime
//! the publisher blocks in place on that runtime; outside any runtime it drives the request on a
//! short-lived current-thread runtime. A current-thread runtime cannot be blocked on, so syncs
//! from one fail.

use std::future::Future;
use std::time::Duration;

use catalog_client::prelude::*;
use snaptable::catalog::{CatalogPublisher, SyncDescriptor};
use snaptable::{Error as TableError, TableResult};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info};

/// Publishes table metadata through the catalog REST API.
#[derive(Debug, Clone)]
pub struct RestCatalogPublisher {
    max_retries: u32,
    timeout: Duration,
    retry_base_delay: Duration,
}

impl Default for RestCatalogPublisher {
    fn default() -> Self {
        Self {
            max_retries: ClientConfig::DEFAULT_MAX_RETRIES,
            timeout: ClientConfig::DEFAULT_TIMEOUT,
            retry_base_delay: ClientConfig::DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

impl RestCatalogPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    fn client_for(&self, descriptor: &SyncDescriptor) -> Result<CatalogClient> {
        let config = ClientConfig::build(descriptor.url.as_str())
            .with_credentials(descriptor.username.as_str(), descriptor.password.as_str())
            .with_max_retries(self.max_retries)
            .with_timeout(self.timeout)
            .with_retry_base_delay(self.retry_base_delay)
            .build()?;
        CatalogClient::new(config)
    }
}

/// The catalog request for `descriptor`.
pub fn sync_request(descriptor: &SyncDescriptor) -> SyncTableRequest {
    SyncTableRequest::new(
        descriptor.database.as_str(),
        descriptor.table.as_str(),
        descriptor.base_path.as_str(),
    )
    .with_partition_fields(descriptor.partition_fields.iter().cloned())
    .with_partition_extractor(descriptor.partition_extractor.as_str())
    .with_assume_date_partitioning(descriptor.assume_date_partitioning)
}

fn block_on<F: Future>(future: F) -> TableResult<F::Output> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(future)))
        }
        Ok(_) => Err(TableError::catalog_sync(
            "catalog sync cannot block a current-thread tokio runtime",
        )),
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| TableError::catalog_sync(format!("failed to start runtime: {e}")))?;
            Ok(runtime.block_on(future))
        }
    }
}

impl CatalogPublisher for RestCatalogPublisher {
    fn sync_table(&self, descriptor: &SyncDescriptor) -> TableResult<bool> {
        let client = self
            .client_for(descriptor)
            .map_err(|e| TableError::catalog_sync(format!("invalid catalog settings: {e}")))?;
        let request = sync_request(descriptor);
        debug!(?request, "syncing table to catalog");
        let response = block_on(async move { client.sync_table(&request).await })?
            .map_err(|e| TableError::catalog_sync(format!("catalog sync failed: {e}")))?;
        info!(
            database = %descriptor.database,
            table = %descriptor.table,
            created = response.created,
            partitions_added = response.partitions_added,
            "catalog sync finished"
        );
        Ok(response.synced)
    }
}
