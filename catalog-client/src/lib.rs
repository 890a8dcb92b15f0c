//! A small REST client for the catalog service that snaptable tables are registered with.
//!
//! ```no_run
//! # async fn sync() -> catalog_client::Result<()> {
//! use catalog_client::prelude::*;
//!
//! let config = ClientConfig::build("http://localhost:10000/")
//!     .with_credentials("catalog", "catalog")
//!     .build()?;
//! let client = CatalogClient::new(config)?;
//! let request = SyncTableRequest::new("sales", "orders", "s3://bucket/t/orders/");
//! let response = client.sync_table(&request).await?;
//! assert!(response.synced);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod models;

pub use client::CatalogClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};

pub mod prelude {
    pub use crate::client::CatalogClient;
    pub use crate::config::ClientConfig;
    pub use crate::error::{Error, Result};
    pub use crate::models::tables::{SyncTableRequest, SyncTableResponse};
}
