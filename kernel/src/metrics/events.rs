//! Metric event types and utilities.

use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a metrics operation.
///
/// Each write call gets a unique MetricId that is used to correlate all events from that call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(Uuid);

impl MetricId {
    /// Generate a new unique MetricId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MetricId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metric events emitted during write operations.
///
/// Events with an `operation_id` belong to a single write call.
#[derive(Debug, Clone)]
pub enum MetricEvent {
    /// Rows were converted to canonical records.
    PipelineCompleted {
        operation_id: MetricId,
        duration: Duration,
        num_rows: u64,
        num_records: u64,
    },

    /// An existing table was removed ahead of an overwrite.
    TableDeleted {
        operation_id: MetricId,
        duration: Duration,
        num_files: u64,
    },

    /// Fresh table metadata was written.
    TableInitialized { operation_id: MetricId },

    /// The transaction client accepted the commit.
    CommitCompleted {
        operation_id: MetricId,
        transaction_id: String,
        duration: Duration,
        num_records: u64,
    },

    /// The commit was not attempted because records failed to write.
    CommitAborted {
        operation_id: MetricId,
        transaction_id: String,
        error_count: u64,
    },

    /// Catalog publication finished, successfully or not.
    CatalogSyncCompleted {
        operation_id: MetricId,
        duration: Duration,
        success: bool,
    },

    /// Storage list operation completed.
    StorageListCompleted { duration: Duration, num_files: u64 },

    /// Storage read operation completed.
    StorageReadCompleted { duration: Duration, bytes_read: u64 },

    /// Storage write operation completed.
    StorageWriteCompleted {
        duration: Duration,
        bytes_written: u64,
    },

    /// Storage delete operation completed.
    StorageDeleteCompleted { duration: Duration, num_files: u64 },
}

impl fmt::Display for MetricEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricEvent::PipelineCompleted {
                operation_id,
                duration,
                num_rows,
                num_records,
            } => write!(
                f,
                "PipelineCompleted(id={operation_id}, duration={duration:?}, rows={num_rows}, records={num_records})"
            ),
            MetricEvent::TableDeleted {
                operation_id,
                duration,
                num_files,
            } => write!(
                f,
                "TableDeleted(id={operation_id}, duration={duration:?}, files={num_files})"
            ),
            MetricEvent::TableInitialized { operation_id } => {
                write!(f, "TableInitialized(id={operation_id})")
            }
            MetricEvent::CommitCompleted {
                operation_id,
                transaction_id,
                duration,
                num_records,
            } => write!(
                f,
                "CommitCompleted(id={operation_id}, txn={transaction_id}, duration={duration:?}, records={num_records})"
            ),
            MetricEvent::CommitAborted {
                operation_id,
                transaction_id,
                error_count,
            } => write!(
                f,
                "CommitAborted(id={operation_id}, txn={transaction_id}, errors={error_count})"
            ),
            MetricEvent::CatalogSyncCompleted {
                operation_id,
                duration,
                success,
            } => write!(
                f,
                "CatalogSyncCompleted(id={operation_id}, duration={duration:?}, success={success})"
            ),
            MetricEvent::StorageListCompleted {
                duration,
                num_files,
            } => write!(
                f,
                "StorageListCompleted(duration={duration:?}, files={num_files})"
            ),
            MetricEvent::StorageReadCompleted {
                duration,
                bytes_read,
            } => write!(
                f,
                "StorageReadCompleted(duration={duration:?}, bytes={bytes_read})"
            ),
            MetricEvent::StorageWriteCompleted {
                duration,
                bytes_written,
            } => write!(
                f,
                "StorageWriteCompleted(duration={duration:?}, bytes={bytes_written})"
            ),
            MetricEvent::StorageDeleteCompleted {
                duration,
                num_files,
            } => write!(
                f,
                "StorageDeleteCompleted(duration={duration:?}, files={num_files})"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_ids_are_unique() {
        assert_ne!(MetricId::new(), MetricId::new());
    }

    #[test]
    fn display_includes_transaction() {
        let event = MetricEvent::CommitAborted {
            operation_id: MetricId::new(),
            transaction_id: "20240101000000000".to_string(),
            error_count: 2,
        };
        let rendered = event.to_string();
        assert!(rendered.contains("txn=20240101000000000"));
        assert!(rendered.contains("errors=2"));
    }
}
