//! Definitions of errors that the snaptable kernel can encounter

use std::num::ParseIntError;

use crate::commit::WriteFailure;

/// A [`std::result::Result`] that has the kernel [`Error`] as the error variant
pub type TableResult<T, E = Error> = std::result::Result<T, E>;

/// All the types of errors that the kernel can run into.
///
/// The first five variants form the write-path taxonomy: [`Configuration`], [`Precondition`] and
/// [`SchemaConversion`] abort a call before any storage mutation, [`WriteFailure`] aggregates
/// per-record failures reported by a transaction client, and [`CatalogSync`] is only surfaced
/// when catalog publication runs under the strict policy.
///
/// [`Configuration`]: Error::Configuration
/// [`Precondition`]: Error::Precondition
/// [`SchemaConversion`]: Error::SchemaConversion
/// [`WriteFailure`]: Error::WriteFailure
/// [`CatalogSync`]: Error::CatalogSync
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A required option is missing or an option holds an invalid value
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The table is not in a state that allows the requested operation
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A row could not be converted to the canonical record schema
    #[error("Schema conversion failed: {0}")]
    SchemaConversion(String),

    /// A record produced an empty or missing key
    #[error("Invalid record key: {0}")]
    InvalidRecordKey(String),

    /// One or more records failed to write
    #[error(transparent)]
    WriteFailure(#[from] WriteFailure),

    /// Publishing table metadata to the catalog failed
    #[error("Catalog sync failed: {0}")]
    CatalogSync(String),

    /// The transaction client reported a failure outside of per-record outcomes
    #[error("Transaction client error: {0}")]
    TransactionClient(String),

    /// Kernel does not support the requested operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// An error performing operations on an object store
    #[error("Error interacting with object store: {0}")]
    ObjectStore(object_store::Error),

    /// An error working with paths from the object store
    #[error("Object store path error: {0}")]
    ObjectStorePath(#[from] object_store::path::Error),

    /// A specified file could not be found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A file that was expected to be absent already exists
    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    /// Unable to parse the table location
    #[error("Invalid table location: {0}")]
    InvalidTableLocation(String),

    /// Could not parse a url
    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Could not serialize or deserialize a json document
    #[error("Invalid json: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// Could not parse an integer
    #[error("Error parsing integer: {0}")]
    ParseIntError(#[from] ParseIntError),

    /// Could not parse a timestamp or instant
    #[error("Error parsing timestamp: {0}")]
    ParseTimestamp(#[from] chrono::ParseError),

    /// A background task could not be joined
    #[error("Failed to join background task: {0}")]
    JoinFailure(String),

    /// An error that indicates a bug in the kernel
    #[error("Internal error {0}. This is a kernel bug, please report.")]
    InternalError(String),

    /// A generic error with a message
    #[error("Generic snaptable error: {0}")]
    Generic(String),
}

// Convenience constructors for Error types that take a String argument
impl Error {
    pub fn configuration(msg: impl ToString) -> Self {
        Self::Configuration(msg.to_string())
    }

    pub fn precondition(msg: impl ToString) -> Self {
        Self::Precondition(msg.to_string())
    }

    pub fn schema_conversion(msg: impl ToString) -> Self {
        Self::SchemaConversion(msg.to_string())
    }

    pub fn invalid_record_key(msg: impl ToString) -> Self {
        Self::InvalidRecordKey(msg.to_string())
    }

    pub fn catalog_sync(msg: impl ToString) -> Self {
        Self::CatalogSync(msg.to_string())
    }

    pub fn transaction_client(msg: impl ToString) -> Self {
        Self::TransactionClient(msg.to_string())
    }

    pub fn unsupported(msg: impl ToString) -> Self {
        Self::Unsupported(msg.to_string())
    }

    pub fn invalid_table_location(location: impl ToString) -> Self {
        Self::InvalidTableLocation(location.to_string())
    }

    pub fn join_failure(msg: impl ToString) -> Self {
        Self::JoinFailure(msg.to_string())
    }

    pub fn internal_error(msg: impl ToString) -> Self {
        Self::InternalError(msg.to_string())
    }

    pub fn generic(msg: impl ToString) -> Self {
        Self::Generic(msg.to_string())
    }

    /// True for the error classes that are raised before the kernel touches storage.
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Precondition(_)
                | Self::SchemaConversion(_)
                | Self::InvalidRecordKey(_)
        )
    }
}

impl From<object_store::Error> for Error {
    fn from(value: object_store::Error) -> Self {
        match value {
            object_store::Error::NotFound { path, .. } => Self::FileNotFound(path),
            object_store::Error::AlreadyExists { path, .. } => Self::FileAlreadyExists(path),
            err => Self::ObjectStore(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_store_not_found_maps_to_file_not_found() {
        let err: Error = object_store::Error::NotFound {
            path: "t/orders/.snaptable/table.json".to_string(),
            source: "missing".into(),
        }
        .into();
        assert!(matches!(err, Error::FileNotFound(p) if p.ends_with("table.json")));
    }

    #[test]
    fn pre_mutation_classes() {
        assert!(Error::configuration("x").is_pre_mutation());
        assert!(Error::precondition("x").is_pre_mutation());
        assert!(Error::schema_conversion("x").is_pre_mutation());
        assert!(!Error::catalog_sync("x").is_pre_mutation());
        assert!(!Error::generic("x").is_pre_mutation());
    }
}
