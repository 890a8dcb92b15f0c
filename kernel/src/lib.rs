//! # snaptable
//!
//! snaptable is the write path for snapshot-style tables that live on object storage. A single
//! call takes a batch of rows, decides what to do about the table's current state, turns the rows
//! into canonical keyed records, writes them through a transaction and commits (or aborts) the
//! whole batch as one unit. Nothing written by a call is visible to readers until its commit
//! succeeds.
//!
//! The entry point is [`DataSource`](datasource::DataSource), which exposes the three call shapes:
//!
//! - [`create_read_relation`](datasource::DataSource::create_read_relation)
//! - [`create_read_relation_with_schema`](datasource::DataSource::create_read_relation_with_schema)
//! - [`create_write_relation`](datasource::DataSource::create_write_relation)
//!
//! # Collaborators
//!
//! The kernel only orchestrates. The pieces it talks to are traits, each with a default
//! implementation shipped in this crate:
//!
//! - [`Engine`]: provides a [`StorageHandler`] for object storage access and a
//!   [`RowProcessor`](pipeline::RowProcessor) for running the record pipeline (possibly in
//!   parallel). See [`engine::default::DefaultEngine`].
//! - [`TransactionClient`](transaction::TransactionClient): begin, write, commit and close. See
//!   [`FileSystemTransactionClient`](transaction::FileSystemTransactionClient).
//! - [`KeyGenerator`](keygen::KeyGenerator): extracts `(record key, partition path)` from a
//!   record, resolved by name from a [`KeyGeneratorRegistry`](keygen::KeyGeneratorRegistry).
//! - [`CatalogPublisher`](catalog::CatalogPublisher): optional post-commit metadata sync. A REST
//!   implementation lives in the `catalog-sync` crate.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use url::Url;

pub mod catalog;
pub mod commit;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod keygen;
pub mod metrics;
pub mod mode;
pub mod options;
pub mod pipeline;
pub mod record;
pub mod relation;
pub mod schema;
pub mod table;
pub mod transaction;
pub mod value;

pub(crate) mod utils;

pub use datasource::DataSource;
pub use error::{Error, TableResult};
pub use mode::SaveMode;
pub use options::ResolvedOptions;
pub use relation::{RelationDescriptor, WriteRelation, WriteStatus};
pub use utils::try_parse_uri;

use metrics::MetricsReporter;
use pipeline::RowProcessor;

/// The metadata that describes an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// The fully qualified path to the object
    pub location: Url,
    /// The last modified time as milliseconds since unix epoch
    pub last_modified: i64,
    /// The size in bytes of the object
    pub size: u64,
}

impl Ord for FileMeta {
    fn cmp(&self, other: &Self) -> Ordering {
        self.location.cmp(&other.location)
    }
}

impl PartialOrd for FileMeta {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FileMeta {
    /// Create a new instance of `FileMeta`
    pub fn new(location: Url, last_modified: i64, size: u64) -> Self {
        Self {
            location,
            last_modified,
            size,
        }
    }
}

/// Provides object storage functionality for the kernel. All paths are fully qualified URLs.
///
/// Directory-like URLs (ending in `/`) are treated as prefixes by [`list`] and
/// [`delete_recursive`]; object stores have no real directories, so a "directory" exists exactly
/// when some object lives under it.
///
/// [`list`]: StorageHandler::list
/// [`delete_recursive`]: StorageHandler::delete_recursive
pub trait StorageHandler: Send + Sync {
    /// Returns true if an object exists at `path`.
    fn exists(&self, path: &Url) -> TableResult<bool>;

    /// Read the full contents of the object at `path`.
    fn read(&self, path: &Url) -> TableResult<Bytes>;

    /// Write `data` to `path`. When `overwrite` is false the write is a put-if-absent and fails
    /// with [`Error::FileAlreadyExists`] if the object is already there.
    fn put(&self, path: &Url, data: Bytes, overwrite: bool) -> TableResult<()>;

    /// List every object under the directory-like `prefix`, sorted by location.
    fn list(&self, prefix: &Url) -> TableResult<Vec<FileMeta>>;

    /// Delete the object at `path`. Deleting a missing object is not an error.
    fn delete(&self, path: &Url) -> TableResult<()>;

    /// Delete every object under the directory-like `prefix`, returning how many were removed.
    fn delete_recursive(&self, prefix: &Url) -> TableResult<u64>;
}

/// The `Engine` trait encapsulates all the functionality an engine or connector needs to provide
/// to the kernel in order to write to a table.
///
/// Engines/Connectors are expected to pass an implementation of this trait when calling into the
/// [`DataSource`].
pub trait Engine: Send + Sync {
    /// Get the connector provided [`StorageHandler`].
    fn storage_handler(&self) -> Arc<dyn StorageHandler>;

    /// Get the connector provided [`RowProcessor`] used to run the record pipeline.
    fn row_processor(&self) -> Arc<dyn RowProcessor>;

    /// Get the connector provided [`MetricsReporter`] for metrics collection.
    ///
    /// Returns an optional reporter that will receive metric events from write operations.
    /// The default implementation returns None (no metrics reporting).
    fn get_metrics_reporter(&self) -> Option<Arc<dyn MetricsReporter>> {
        None
    }
}
