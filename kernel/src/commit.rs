//! The commit validator: decides between committing and aborting a transaction from its
//! per-record write outcomes.
//!
//! A commit is all or nothing. If any record failed to write, [`validate_and_commit`] never calls
//! [`TransactionClient::commit`] and instead reports a [`WriteFailure`] that counts every failed
//! record.

use std::collections::HashMap;

use tracing::{error, info, warn};

use crate::options::ResolvedOptions;
use crate::transaction::{TransactionClient, TransactionId, WriteOutcome};
use crate::TableResult;

/// Upper bound on the `(record key, cause)` pairs carried by a [`WriteFailure`].
pub const MAX_REPORTED_ERRORS: usize = 100;

/// What [`TransactionClient::commit`] was called with and what it returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub transaction_id: TransactionId,
    /// Whether the client accepted the commit
    pub success: bool,
    /// The metadata attached to the commit, if any
    pub metadata: Option<HashMap<String, String>>,
}

/// One or more records of a transaction failed to write, so the transaction was not committed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Transaction {transaction_id} aborted: {error_count} records failed to write")]
pub struct WriteFailure {
    pub transaction_id: TransactionId,
    /// Number of failed records, exact
    pub error_count: usize,
    /// Up to [`MAX_REPORTED_ERRORS`] `(record key, cause)` pairs, in outcome order. Empty unless
    /// verbose error reporting was requested.
    pub sample: Vec<(String, String)>,
}

/// The decision made by [`validate_and_commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitDecision {
    /// Every record succeeded and commit was called. The client may still have rejected it; see
    /// [`CommitResult::success`].
    Committed(CommitResult),
    /// At least one record failed; commit was not called.
    Aborted(WriteFailure),
}

/// Count the failed outcomes and either commit the transaction or abort it.
///
/// On the commit path the metadata passed to the client is exactly the set of resolved options
/// whose keys start with the commit metadata prefix, or `None` if there are none. A `false` return
/// from the client is logged and reported in the [`CommitResult`], not raised.
pub fn validate_and_commit(
    client: &mut dyn TransactionClient,
    txn: &TransactionId,
    outcomes: Vec<WriteOutcome>,
    options: &ResolvedOptions,
    verbose: bool,
) -> TableResult<CommitDecision> {
    let error_count = outcomes.iter().filter(|o| !o.is_success()).count();
    if error_count > 0 {
        let sample: Vec<(String, String)> = if verbose {
            outcomes
                .iter()
                .filter_map(|o| {
                    o.error
                        .as_ref()
                        .map(|cause| (o.record_key.clone(), cause.clone()))
                })
                .take(MAX_REPORTED_ERRORS)
                .collect()
        } else {
            Vec::new()
        };
        error!(%txn, error_count, "aborting transaction, records failed to write");
        for (key, cause) in &sample {
            error!(%txn, record_key = %key, "write failed: {cause}");
        }
        return Ok(CommitDecision::Aborted(WriteFailure {
            transaction_id: txn.clone(),
            error_count,
            sample,
        }));
    }

    let metadata = Some(options.commit_metadata()).filter(|m| !m.is_empty());
    let num_records = outcomes.len();
    let success = client.commit(txn, outcomes, metadata.clone())?;
    if success {
        info!(%txn, num_records, "commit succeeded");
    } else {
        warn!(%txn, num_records, "commit was rejected by the transaction client");
    }
    Ok(CommitDecision::Committed(CommitResult {
        transaction_id: txn.clone(),
        success,
        metadata,
    }))
}
