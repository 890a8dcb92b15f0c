//! The transaction client contract: begin, write, commit and close.
//!
//! The kernel never writes table data itself. For every write call it asks a
//! [`TransactionClientFactory`] for a [`TransactionClient`], and drives it through one
//! transaction:
//!
//! 1. [`start_transaction`] returns a fresh [`TransactionId`],
//! 2. [`perform_operation`] writes the canonical records and reports one [`WriteOutcome`] per
//!    record,
//! 3. [`commit`] makes the written records visible, all at once, and returns whether it did,
//! 4. [`close`] releases the client's resources.
//!
//! Nothing written by [`perform_operation`] may be visible to readers until [`commit`] returns
//! `true`. Serializing or rejecting concurrent transactions against the same table is the
//! client's job; the kernel does not lock.
//!
//! The kernel wraps every client in a [`ScopedClient`], which guarantees that [`close`] runs
//! exactly once on every path out of a write call, including early returns and panics.
//!
//! [`start_transaction`]: TransactionClient::start_transaction
//! [`perform_operation`]: TransactionClient::perform_operation
//! [`commit`]: TransactionClient::commit
//! [`close`]: TransactionClient::close

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::options::{OperationKind, ResolvedOptions};
use crate::record::{CanonicalRecord, CanonicalSchema, RecordKey};
use crate::utils::require;
use crate::{Engine, Error, TableResult};

mod filesystem;

pub use filesystem::{
    CommitFile, FileSystemTransactionClient, FileSystemTransactionClientFactory, WriteStat,
};

const TRANSACTION_ID_FORMAT: &str = "%Y%m%d%H%M%S%3f";
const TRANSACTION_ID_LEN: usize = 17;

/// Identifies one transaction: a UTC timestamp formatted as `yyyyMMddHHmmssSSS`.
///
/// Ids order the same way as the instants they were created at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId(String);

impl TransactionId {
    /// An id for the current instant.
    pub fn now() -> Self {
        Self(Utc::now().format(TRANSACTION_ID_FORMAT).to_string())
    }

    /// Parse and validate an id.
    pub fn try_parse(id: impl Into<String>) -> TableResult<Self> {
        let id = id.into();
        require!(
            id.len() == TRANSACTION_ID_LEN && id.bytes().all(|b| b.is_ascii_digit()),
            Error::generic(format!(
                "Transaction id '{id}' is not a yyyyMMddHHmmssSSS timestamp"
            ))
        );
        NaiveDateTime::parse_from_str(&id, TRANSACTION_ID_FORMAT)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TransactionId {
    type Error = Error;

    fn try_from(value: String) -> TableResult<Self> {
        Self::try_parse(value)
    }
}

impl From<TransactionId> for String {
    fn from(value: TransactionId) -> Self {
        value.0
    }
}

/// The result of writing a single record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub record_key: String,
    pub partition_path: String,
    /// Why the write failed; `None` for a successful write
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn success(key: &RecordKey) -> Self {
        Self {
            record_key: key.key().to_string(),
            partition_path: key.partition_path().to_string(),
            error: None,
        }
    }

    pub fn failure(key: &RecordKey, cause: impl ToString) -> Self {
        Self {
            record_key: key.key().to_string(),
            partition_path: key.partition_path().to_string(),
            error: Some(cause.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a client needs to know about the write it serves.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub base_path: Url,
    pub table_name: String,
    pub schema: Arc<CanonicalSchema>,
    pub options: ResolvedOptions,
}

/// Transactional access to one table. See the [module docs](self).
pub trait TransactionClient: Send {
    /// Begin a transaction.
    fn start_transaction(&mut self) -> TableResult<TransactionId>;

    /// Write `records` within the transaction, reporting one outcome per record. Per-record
    /// failures are reported as outcomes; an `Err` means the client could not write at all.
    fn perform_operation(
        &mut self,
        operation: OperationKind,
        records: Vec<CanonicalRecord>,
        txn: &TransactionId,
    ) -> TableResult<Vec<WriteOutcome>>;

    /// Make everything written within the transaction visible, attaching `metadata` to the
    /// commit. Returns `false` if the commit was rejected.
    fn commit(
        &mut self,
        txn: &TransactionId,
        outcomes: Vec<WriteOutcome>,
        metadata: Option<HashMap<String, String>>,
    ) -> TableResult<bool>;

    /// Release resources held by the client.
    fn close(&mut self) -> TableResult<()>;
}

/// Creates the [`TransactionClient`] for a write call. Invoked at most once per call, and only
/// after every validation step has passed.
pub trait TransactionClientFactory: Send + Sync {
    fn create(
        &self,
        engine: &dyn Engine,
        context: ClientContext,
    ) -> TableResult<Box<dyn TransactionClient>>;
}

/// Owns a [`TransactionClient`] and closes it exactly once: either explicitly through
/// [`TransactionClient::close`] or when dropped.
pub struct ScopedClient {
    inner: Box<dyn TransactionClient>,
    closed: bool,
}

impl ScopedClient {
    pub fn new(inner: Box<dyn TransactionClient>) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for ScopedClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedClient")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl TransactionClient for ScopedClient {
    fn start_transaction(&mut self) -> TableResult<TransactionId> {
        require!(
            !self.closed,
            Error::transaction_client("client is already closed")
        );
        self.inner.start_transaction()
    }

    fn perform_operation(
        &mut self,
        operation: OperationKind,
        records: Vec<CanonicalRecord>,
        txn: &TransactionId,
    ) -> TableResult<Vec<WriteOutcome>> {
        require!(
            !self.closed,
            Error::transaction_client("client is already closed")
        );
        self.inner.perform_operation(operation, records, txn)
    }

    fn commit(
        &mut self,
        txn: &TransactionId,
        outcomes: Vec<WriteOutcome>,
        metadata: Option<HashMap<String, String>>,
    ) -> TableResult<bool> {
        require!(
            !self.closed,
            Error::transaction_client("client is already closed")
        );
        self.inner.commit(txn, outcomes, metadata)
    }

    fn close(&mut self) -> TableResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("closing transaction client");
        self.inner.close()
    }
}

impl Drop for ScopedClient {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close transaction client: {err}");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Counts calls and fails nothing.
    #[derive(Debug, Default)]
    pub(crate) struct CountingClient {
        pub(crate) closes: Arc<AtomicUsize>,
    }

    impl TransactionClient for CountingClient {
        fn start_transaction(&mut self) -> TableResult<TransactionId> {
            Ok(TransactionId::now())
        }

        fn perform_operation(
            &mut self,
            _: OperationKind,
            records: Vec<CanonicalRecord>,
            _: &TransactionId,
        ) -> TableResult<Vec<WriteOutcome>> {
            Ok(records
                .iter()
                .map(|r| WriteOutcome::success(&r.key))
                .collect())
        }

        fn commit(
            &mut self,
            _: &TransactionId,
            _: Vec<WriteOutcome>,
            _: Option<HashMap<String, String>>,
        ) -> TableResult<bool> {
            Ok(true)
        }

        fn close(&mut self) -> TableResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn transaction_ids() {
        let id = TransactionId::now();
        assert_eq!(id.as_str().len(), 17);
        assert_eq!(TransactionId::try_parse(id.as_str()).unwrap(), id);

        assert!(TransactionId::try_parse("2024010112000012").is_err());
        assert!(TransactionId::try_parse("2024-01-01T12:00").is_err());
        assert!(matches!(
            TransactionId::try_parse("20241301120000123"),
            Err(Error::ParseTimestamp(_))
        ));

        let earlier = TransactionId::try_parse("20240101120000123").unwrap();
        let later = TransactionId::try_parse("20240101120000124").unwrap();
        assert!(earlier < later);
        assert_eq!(
            serde_json::to_value(&earlier).unwrap(),
            serde_json::json!("20240101120000123")
        );
    }

    #[test]
    fn scoped_client_closes_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut client = ScopedClient::new(Box::new(CountingClient {
            closes: closes.clone(),
        }));
        client.close().unwrap();
        client.close().unwrap();
        assert!(client.is_closed());
        assert!(matches!(
            client.start_transaction(),
            Err(Error::TransactionClient(_))
        ));
        drop(client);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scoped_client_closes_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let mut client = ScopedClient::new(Box::new(CountingClient {
                closes: closes.clone(),
            }));
            client.start_transaction().unwrap();
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
