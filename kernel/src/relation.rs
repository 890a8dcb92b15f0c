//! What the data source hands back: relation descriptors and typed write results.

use url::Url;

use crate::catalog::CatalogSyncStatus;
use crate::commit::{CommitResult, WriteFailure};
use crate::options::{ResolvedOptions, StorageType, ViewType};
use crate::schema::SchemaRef;
use crate::transaction::TransactionId;
use crate::{Error, TableResult};

/// Which records a read relation exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadView {
    /// The latest committed snapshot
    ReadOptimized,
    /// Records committed after `begin_instant`, up to and including `end_instant` (or the latest
    /// commit when absent)
    Incremental {
        begin_instant: TransactionId,
        end_instant: Option<TransactionId>,
    },
}

impl ReadView {
    pub fn try_from_options(options: &ResolvedOptions) -> TableResult<Self> {
        match options.view_type()? {
            ViewType::ReadOptimized => Ok(ReadView::ReadOptimized),
            ViewType::Realtime => Err(Error::unsupported(
                "the realtime view is not served by the data source",
            )),
            ViewType::Incremental => {
                let storage_type = options.storage_type()?;
                if storage_type != StorageType::CopyOnWrite {
                    return Err(Error::unsupported(format!(
                        "incremental views are only supported on {} tables, not {storage_type}",
                        StorageType::CopyOnWrite
                    )));
                }
                let begin = options.begin_instant().ok_or_else(|| {
                    Error::configuration(format!(
                        "'{}' must be set for incremental views",
                        crate::options::BEGIN_INSTANTTIME_KEY
                    ))
                })?;
                let begin_instant = TransactionId::try_parse(begin.trim())
                    .map_err(|e| Error::configuration(format!("Invalid begin instant: {e}")))?;
                let end_instant = options
                    .end_instant()
                    .map(|end| TransactionId::try_parse(end.trim()))
                    .transpose()
                    .map_err(|e| Error::configuration(format!("Invalid end instant: {e}")))?;
                if let Some(end) = &end_instant {
                    if *end < begin_instant {
                        return Err(Error::configuration(format!(
                            "End instant {end} is before begin instant {begin_instant}"
                        )));
                    }
                }
                Ok(ReadView::Incremental {
                    begin_instant,
                    end_instant,
                })
            }
        }
    }
}

/// Describes how to read a table: where it lives, with which options, schema and view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub base_path: Url,
    pub options: ResolvedOptions,
    /// `None` when the schema is left to be inferred by the reader
    pub schema: Option<SchemaRef>,
    pub view: ReadView,
}

impl RelationDescriptor {
    pub fn try_new(options: ResolvedOptions, schema: Option<SchemaRef>) -> TableResult<Self> {
        let base_path = options.base_path()?;
        let view = ReadView::try_from_options(&options)?;
        Ok(Self {
            base_path,
            options,
            schema,
            view,
        })
    }
}

/// The outcome of a write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    /// The transaction committed.
    Committed {
        commit: CommitResult,
        catalog_sync: CatalogSyncStatus,
    },
    /// Every record was written but the transaction client rejected the commit.
    CommitRejected(CommitResult),
    /// Records failed to write and the transaction was not committed.
    Failed(WriteFailure),
    /// The table exists and the save mode said to leave it alone.
    Skipped,
}

impl WriteStatus {
    /// True for a committed write, and for a skipped one, since nothing was asked to change.
    pub fn is_success(&self) -> bool {
        matches!(self, WriteStatus::Committed { .. } | WriteStatus::Skipped)
    }

    /// The id of the transaction this write ran, if it got that far.
    pub fn transaction_id(&self) -> Option<&TransactionId> {
        match self {
            WriteStatus::Committed { commit, .. } | WriteStatus::CommitRejected(commit) => {
                Some(&commit.transaction_id)
            }
            WriteStatus::Failed(failure) => Some(&failure.transaction_id),
            WriteStatus::Skipped => None,
        }
    }
}

/// What [`create_write_relation`](crate::DataSource::create_write_relation) returns: a
/// descriptor for reading the table plus the typed status of the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRelation {
    pub relation: RelationDescriptor,
    pub status: WriteStatus,
}

impl WriteRelation {
    /// Turn a failed or rejected write into an error, for callers that do not want to match on
    /// [`WriteStatus`].
    pub fn into_result(self) -> TableResult<RelationDescriptor> {
        match self.status {
            WriteStatus::Committed { .. } | WriteStatus::Skipped => Ok(self.relation),
            WriteStatus::Failed(failure) => Err(failure.into()),
            WriteStatus::CommitRejected(commit) => Err(Error::transaction_client(format!(
                "commit of transaction {} was rejected",
                commit.transaction_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::options::{
        resolve_options, OptionScope, BEGIN_INSTANTTIME_KEY, END_INSTANTTIME_KEY, PATH_KEY,
        STORAGE_TYPE_KEY, VIEW_TYPE_KEY,
    };

    fn options(extra: &[(&str, &str)]) -> ResolvedOptions {
        let mut raw = HashMap::from([(PATH_KEY.to_string(), "/t/orders".to_string())]);
        raw.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        resolve_options(&raw, OptionScope::Read).unwrap()
    }

    #[test]
    fn default_view_is_read_optimized() {
        let descriptor = RelationDescriptor::try_new(options(&[]), None).unwrap();
        assert_eq!(descriptor.view, ReadView::ReadOptimized);
        assert_eq!(descriptor.base_path.path(), "/t/orders/");
    }

    #[test]
    fn realtime_is_unsupported() {
        let err = RelationDescriptor::try_new(options(&[(VIEW_TYPE_KEY, "realtime")]), None)
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn incremental_views() {
        let err = RelationDescriptor::try_new(options(&[(VIEW_TYPE_KEY, "incremental")]), None)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains(BEGIN_INSTANTTIME_KEY)));

        let descriptor = RelationDescriptor::try_new(
            options(&[
                (VIEW_TYPE_KEY, "incremental"),
                (BEGIN_INSTANTTIME_KEY, "20240101000000000"),
            ]),
            None,
        )
        .unwrap();
        assert!(matches!(
            descriptor.view,
            ReadView::Incremental { end_instant: None, .. }
        ));

        let err = RelationDescriptor::try_new(
            options(&[
                (VIEW_TYPE_KEY, "incremental"),
                (BEGIN_INSTANTTIME_KEY, "20240101000000000"),
                (END_INSTANTTIME_KEY, "20230101000000000"),
            ]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = RelationDescriptor::try_new(
            options(&[
                (VIEW_TYPE_KEY, "incremental"),
                (BEGIN_INSTANTTIME_KEY, "20240101000000000"),
                (STORAGE_TYPE_KEY, "MERGE_ON_READ"),
            ]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn failed_status_converts_to_write_failure() {
        let failure = WriteFailure {
            transaction_id: TransactionId::try_parse("20240101000000000").unwrap(),
            error_count: 2,
            sample: vec![],
        };
        let relation = WriteRelation {
            relation: RelationDescriptor::try_new(options(&[]), None).unwrap(),
            status: WriteStatus::Failed(failure.clone()),
        };
        assert!(!relation.status.is_success());
        assert_eq!(
            relation.status.transaction_id(),
            Some(&failure.transaction_id)
        );
        assert!(matches!(
            relation.into_result(),
            Err(Error::WriteFailure(f)) if f == failure
        ));
    }
}
