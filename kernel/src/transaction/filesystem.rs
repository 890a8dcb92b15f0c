//! Transaction client that commits directly to the table's storage.
//!
//! Data files are written under their partition directories, and a transaction becomes visible
//! once its `<txn>.commit` file lands in the metadata folder. The commit file is written with
//! put-if-absent, so of two clients racing to commit the same transaction id only one succeeds.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{
    ClientContext, TransactionClient, TransactionClientFactory, TransactionId, WriteOutcome,
};
use crate::options::OperationKind;
use crate::record::{CanonicalRecord, CanonicalSchema};
use crate::schema::StructType;
use crate::table::{read_table_config, TableLayout};
use crate::utils::{current_time_ms, require};
use crate::{Engine, Error, StorageHandler, TableResult};

/// How many fresh ids to try when another transaction started within the same millisecond.
const START_ATTEMPTS: usize = 5;

/// One line of a data file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataLine<'a> {
    record_key: &'a str,
    partition_path: &'a str,
    transaction_id: &'a TransactionId,
    payload: serde_json::Value,
}

/// Write statistics of one partition within a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStat {
    pub file_id: String,
    /// Data file location relative to the table base path
    pub path: String,
    pub num_writes: u64,
    pub num_errors: u64,
}

/// Contents of `<txn>.inflight`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InflightMarker {
    transaction_id: TransactionId,
    started_at_ms: i64,
}

/// Contents of `<txn>.commit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFile {
    pub transaction_id: TransactionId,
    pub operation: Option<OperationKind>,
    pub schema: StructType,
    pub partition_to_write_stats: BTreeMap<String, Vec<WriteStat>>,
    pub extra_metadata: HashMap<String, String>,
    pub committed_at_ms: i64,
}

/// A [`TransactionClient`] that writes json-lines data files and commit files through the
/// engine's [`StorageHandler`].
pub struct FileSystemTransactionClient {
    storage: Arc<dyn StorageHandler>,
    layout: TableLayout,
    schema: Arc<CanonicalSchema>,
    table_name: String,
    inflight: Option<TransactionId>,
    operation: Option<OperationKind>,
    write_stats: BTreeMap<String, Vec<WriteStat>>,
    closed: bool,
}

impl FileSystemTransactionClient {
    pub fn new(storage: Arc<dyn StorageHandler>, context: ClientContext) -> Self {
        Self {
            storage,
            layout: TableLayout::new(context.base_path),
            schema: context.schema,
            table_name: context.table_name,
            inflight: None,
            operation: None,
            write_stats: BTreeMap::new(),
            closed: false,
        }
    }

    fn check_inflight(&self, txn: &TransactionId) -> TableResult<()> {
        require!(
            self.inflight.as_ref() == Some(txn),
            Error::transaction_client(format!("Transaction {txn} is not in flight"))
        );
        Ok(())
    }

    fn encode_partition(
        &self,
        txn: &TransactionId,
        records: &[CanonicalRecord],
    ) -> (Vec<u8>, Vec<WriteOutcome>) {
        let mut buffer = Vec::new();
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let line = record
                .payload
                .to_json(&self.schema)
                .and_then(|payload| {
                    let line = DataLine {
                        record_key: record.record_key(),
                        partition_path: record.partition_path(),
                        transaction_id: txn,
                        payload,
                    };
                    Ok(serde_json::to_vec(&line)?)
                });
            match line {
                Ok(line) => {
                    buffer.extend_from_slice(&line);
                    buffer.push(b'\n');
                    outcomes.push(WriteOutcome::success(&record.key));
                }
                Err(e) => outcomes.push(WriteOutcome::failure(&record.key, e)),
            }
        }
        (buffer, outcomes)
    }

    fn write_partition(
        &mut self,
        txn: &TransactionId,
        partition: String,
        records: Vec<CanonicalRecord>,
    ) -> Vec<WriteOutcome> {
        let file_id = Uuid::new_v4().to_string();
        let location = match self.layout.data_file(&partition, &file_id, txn) {
            Ok(location) => location,
            Err(e) => {
                return records
                    .iter()
                    .map(|r| WriteOutcome::failure(&r.key, &e))
                    .collect()
            }
        };
        let (buffer, outcomes) = self.encode_partition(txn, &records);
        let num_errors = outcomes.iter().filter(|o| !o.is_success()).count() as u64;
        let num_writes = outcomes.len() as u64 - num_errors;
        if num_writes > 0 {
            if let Err(e) = self.storage.put(&location, Bytes::from(buffer), false) {
                warn!(%partition, "failed to write data file: {e}");
                return records
                    .iter()
                    .map(|r| WriteOutcome::failure(&r.key, &e))
                    .collect();
            }
        }
        let relative = location
            .as_str()
            .strip_prefix(self.layout.base_path().as_str())
            .unwrap_or(location.as_str())
            .to_string();
        debug!(%partition, num_writes, num_errors, path = %relative, "wrote data file");
        self.write_stats.entry(partition).or_default().push(WriteStat {
            file_id,
            path: relative,
            num_writes,
            num_errors,
        });
        outcomes
    }
}

impl TransactionClient for FileSystemTransactionClient {
    #[instrument(skip_all, fields(table = %self.table_name))]
    fn start_transaction(&mut self) -> TableResult<TransactionId> {
        require!(
            self.inflight.is_none(),
            Error::transaction_client("a transaction is already in flight")
        );
        // the table must have been initialized
        read_table_config(self.storage.as_ref(), &self.layout)?;
        for _ in 0..START_ATTEMPTS {
            let txn = TransactionId::now();
            if self.storage.exists(&self.layout.commit_file(&txn)?)? {
                std::thread::sleep(Duration::from_millis(1));
                continue;
            }
            let marker = InflightMarker {
                transaction_id: txn.clone(),
                started_at_ms: current_time_ms()?,
            };
            let data = Bytes::from(serde_json::to_vec(&marker)?);
            match self
                .storage
                .put(&self.layout.inflight_file(&txn)?, data, false)
            {
                Ok(()) => {
                    info!(%txn, "started transaction");
                    self.inflight = Some(txn.clone());
                    self.write_stats.clear();
                    return Ok(txn);
                }
                Err(Error::FileAlreadyExists(_)) => {
                    debug!(%txn, "transaction id taken, retrying");
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::transaction_client(format!(
            "Could not allocate a transaction id after {START_ATTEMPTS} attempts"
        )))
    }

    #[instrument(skip_all, fields(%txn, %operation, records = records.len()))]
    fn perform_operation(
        &mut self,
        operation: OperationKind,
        records: Vec<CanonicalRecord>,
        txn: &TransactionId,
    ) -> TableResult<Vec<WriteOutcome>> {
        self.check_inflight(txn)?;
        self.operation = Some(operation);
        let mut partitions: BTreeMap<String, Vec<CanonicalRecord>> = BTreeMap::new();
        for record in records {
            partitions
                .entry(record.partition_path().to_string())
                .or_default()
                .push(record);
        }
        let mut outcomes = Vec::new();
        for (partition, records) in partitions {
            outcomes.extend(self.write_partition(txn, partition, records));
        }
        Ok(outcomes)
    }

    #[instrument(skip_all, fields(%txn))]
    fn commit(
        &mut self,
        txn: &TransactionId,
        outcomes: Vec<WriteOutcome>,
        metadata: Option<HashMap<String, String>>,
    ) -> TableResult<bool> {
        self.check_inflight(txn)?;
        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        if failed > 0 {
            error!(failed, "refusing to commit a transaction with failed writes");
            return Ok(false);
        }
        let commit = CommitFile {
            transaction_id: txn.clone(),
            operation: self.operation,
            schema: self.schema.schema.as_ref().clone(),
            partition_to_write_stats: std::mem::take(&mut self.write_stats),
            extra_metadata: metadata.unwrap_or_default(),
            committed_at_ms: current_time_ms()?,
        };
        let data = Bytes::from(serde_json::to_vec(&commit)?);
        match self.storage.put(&self.layout.commit_file(txn)?, data, false) {
            Ok(()) => {}
            Err(Error::FileAlreadyExists(_)) => {
                error!("transaction was already committed by another writer");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
        self.inflight = None;
        // the commit is durable at this point; a stale marker does not undo it
        let inflight = self.layout.inflight_file(txn)?;
        if let Err(e) = self.storage.delete(&inflight) {
            warn!(%inflight, "committed, but failed to remove the in-flight marker: {e}");
        }
        info!(records = outcomes.len(), "committed transaction");
        Ok(true)
    }

    fn close(&mut self) -> TableResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(txn) = self.inflight.take() {
            warn!(%txn, table = %self.table_name, "closing client with an uncommitted transaction");
        }
        Ok(())
    }
}

/// Creates a [`FileSystemTransactionClient`] on the engine's storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemTransactionClientFactory;

impl TransactionClientFactory for FileSystemTransactionClientFactory {
    fn create(
        &self,
        engine: &dyn Engine,
        context: ClientContext,
    ) -> TableResult<Box<dyn TransactionClient>> {
        Ok(Box::new(FileSystemTransactionClient::new(
            engine.storage_handler(),
            context,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use object_store::memory::InMemory;
    use url::Url;

    use super::*;
    use crate::engine::default::DefaultEngine;
    use crate::keygen::SimpleKeyGenerator;
    use crate::options::{
        resolve_options, OptionScope, StorageType, PARTITIONPATH_FIELD_KEY, PATH_KEY,
        RECORDKEY_FIELD_KEY, TABLE_NAME_KEY,
    };
    use crate::pipeline::RecordPipeline;
    use crate::schema::{DataType, StructField};
    use crate::table::{committed_transactions, initialize_table};
    use crate::value::{Row, Scalar};

    struct Fixture {
        engine: DefaultEngine<crate::engine::default::executor::tokio::TokioBackgroundExecutor>,
        context: ClientContext,
        pipeline: RecordPipeline,
    }

    fn fixture() -> Fixture {
        let engine = DefaultEngine::new(Arc::new(InMemory::new()));
        let raw: HashMap<String, String> = [
            (PATH_KEY, "memory:///t/orders"),
            (TABLE_NAME_KEY, "orders"),
            (RECORDKEY_FIELD_KEY, "id"),
            (PARTITIONPATH_FIELD_KEY, "region"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let options = resolve_options(&raw, OptionScope::Write).unwrap();
        let schema = StructType::new_unchecked([
            StructField::not_null("id", DataType::STRING),
            StructField::nullable("ts", DataType::LONG),
            StructField::nullable("region", DataType::STRING),
        ]);
        let schema = Arc::new(CanonicalSchema::try_new("orders", Arc::new(schema)).unwrap());
        let pipeline = RecordPipeline::try_new(
            schema.clone(),
            &options,
            Arc::new(SimpleKeyGenerator::new("id", "region")),
        )
        .unwrap();
        let context = ClientContext {
            base_path: Url::parse("memory:///t/orders/").unwrap(),
            table_name: "orders".to_string(),
            schema,
            options,
        };
        Fixture {
            engine,
            context,
            pipeline,
        }
    }

    fn records(pipeline: &RecordPipeline, rows: &[(&str, i64, &str)]) -> Vec<CanonicalRecord> {
        pipeline
            .process_rows(
                rows.iter()
                    .map(|(id, ts, region)| {
                        Row::from(vec![Scalar::from(*id), Scalar::Long(*ts), Scalar::from(*region)])
                    })
                    .collect(),
            )
            .unwrap()
    }

    #[test]
    fn start_requires_an_initialized_table() {
        let fixture = fixture();
        let mut client = FileSystemTransactionClientFactory
            .create(&fixture.engine, fixture.context.clone())
            .unwrap();
        assert!(matches!(
            client.start_transaction(),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn write_and_commit() {
        let fixture = fixture();
        let storage = fixture.engine.storage_handler();
        let layout = TableLayout::new(fixture.context.base_path.clone());
        initialize_table(storage.as_ref(), &layout, "orders", StorageType::CopyOnWrite).unwrap();

        let mut client = FileSystemTransactionClient::new(storage.clone(), fixture.context.clone());
        let txn = client.start_transaction().unwrap();
        assert!(storage.exists(&layout.inflight_file(&txn).unwrap()).unwrap());

        let records = records(
            &fixture.pipeline,
            &[("a", 1, "eu"), ("b", 2, "us"), ("c", 3, "eu")],
        );
        let outcomes = client
            .perform_operation(OperationKind::Upsert, records, &txn)
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(WriteOutcome::is_success));
        // nothing visible before the commit
        assert!(committed_transactions(storage.as_ref(), &layout)
            .unwrap()
            .is_empty());

        let metadata = HashMap::from([("_job".to_string(), "nightly".to_string())]);
        assert!(client.commit(&txn, outcomes, Some(metadata.clone())).unwrap());
        assert!(!storage.exists(&layout.inflight_file(&txn).unwrap()).unwrap());
        assert_eq!(
            committed_transactions(storage.as_ref(), &layout).unwrap(),
            vec![txn.clone()]
        );

        let commit: CommitFile =
            serde_json::from_slice(&storage.read(&layout.commit_file(&txn).unwrap()).unwrap())
                .unwrap();
        assert_eq!(commit.extra_metadata, metadata);
        assert_eq!(commit.operation, Some(OperationKind::Upsert));
        let eu = &commit.partition_to_write_stats["eu"];
        assert_eq!(eu.len(), 1);
        assert_eq!(eu[0].num_writes, 2);

        let data = storage
            .read(&fixture.context.base_path.join(&eu[0].path).unwrap())
            .unwrap();
        let lines: Vec<serde_json::Value> = data
            .split(|b| *b == b'\n')
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_slice(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["recordKey"], "a");
        assert_eq!(lines[0]["payload"]["ts"], 1);
        client.close().unwrap();
    }

    /// Storage whose deletes always fail.
    struct NoDeletes(Arc<dyn StorageHandler>);

    impl StorageHandler for NoDeletes {
        fn exists(&self, path: &Url) -> TableResult<bool> {
            self.0.exists(path)
        }
        fn read(&self, path: &Url) -> TableResult<Bytes> {
            self.0.read(path)
        }
        fn put(&self, path: &Url, data: Bytes, overwrite: bool) -> TableResult<()> {
            self.0.put(path, data, overwrite)
        }
        fn list(&self, prefix: &Url) -> TableResult<Vec<crate::FileMeta>> {
            self.0.list(prefix)
        }
        fn delete(&self, path: &Url) -> TableResult<()> {
            Err(Error::generic(format!("delete of {path} denied")))
        }
        fn delete_recursive(&self, prefix: &Url) -> TableResult<u64> {
            Err(Error::generic(format!("delete of {prefix} denied")))
        }
    }

    #[test]
    fn leftover_inflight_marker_does_not_fail_a_durable_commit() {
        let fixture = fixture();
        let storage = fixture.engine.storage_handler();
        let layout = TableLayout::new(fixture.context.base_path.clone());
        initialize_table(storage.as_ref(), &layout, "orders", StorageType::CopyOnWrite).unwrap();

        let mut client = FileSystemTransactionClient::new(
            Arc::new(NoDeletes(storage.clone())),
            fixture.context.clone(),
        );
        let txn = client.start_transaction().unwrap();
        let outcomes = client
            .perform_operation(
                OperationKind::Insert,
                records(&fixture.pipeline, &[("a", 1, "eu")]),
                &txn,
            )
            .unwrap();
        assert!(client.commit(&txn, outcomes, None).unwrap());
        assert_eq!(
            committed_transactions(storage.as_ref(), &layout).unwrap(),
            vec![txn.clone()]
        );
        assert!(storage.exists(&layout.inflight_file(&txn).unwrap()).unwrap());
        client.close().unwrap();
    }

    #[test]
    fn commit_refuses_failed_outcomes_and_unknown_transactions() {
        let fixture = fixture();
        let storage = fixture.engine.storage_handler();
        let layout = TableLayout::new(fixture.context.base_path.clone());
        initialize_table(storage.as_ref(), &layout, "orders", StorageType::CopyOnWrite).unwrap();

        let mut client = FileSystemTransactionClient::new(storage.clone(), fixture.context.clone());
        let other = TransactionId::try_parse("20200101000000000").unwrap();
        assert!(matches!(
            client.commit(&other, vec![], None),
            Err(Error::TransactionClient(_))
        ));

        let txn = client.start_transaction().unwrap();
        let written = records(&fixture.pipeline, &[("a", 1, "eu")]);
        let outcomes = vec![WriteOutcome::failure(&written[0].key, "disk full")];
        assert!(!client.commit(&txn, outcomes, None).unwrap());
        assert!(committed_transactions(storage.as_ref(), &layout)
            .unwrap()
            .is_empty());
        client.close().unwrap();
        client.close().unwrap();
    }
}
