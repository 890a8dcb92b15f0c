//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use object_store::memory::InMemory;
use snaptable::catalog::{CatalogPublisher, SyncDescriptor};
use snaptable::engine::default::executor::tokio::TokioBackgroundExecutor;
use snaptable::engine::default::DefaultEngine;
use snaptable::options::{OperationKind, PATH_KEY, RECORDKEY_FIELD_KEY, TABLE_NAME_KEY};
use snaptable::record::CanonicalRecord;
use snaptable::schema::{DataType, SchemaRef, StructField, StructType};
use snaptable::transaction::{
    ClientContext, TransactionClient, TransactionClientFactory, TransactionId, WriteOutcome,
};
use snaptable::value::{Row, RowBatch, Scalar};
use snaptable::{Engine, Error, TableResult};

pub fn memory_engine() -> DefaultEngine<TokioBackgroundExecutor> {
    DefaultEngine::new(Arc::new(InMemory::new()))
}

pub fn write_options(path: &str, table: &str, extra: &[(&str, &str)]) -> HashMap<String, String> {
    let mut options: HashMap<String, String> = [
        (PATH_KEY, path),
        (TABLE_NAME_KEY, table),
        (RECORDKEY_FIELD_KEY, "id"),
    ]
    .into_iter()
    .chain(extra.iter().copied())
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    options.retain(|_, v| !v.is_empty());
    options
}

pub fn orders_schema() -> SchemaRef {
    Arc::new(StructType::new_unchecked([
        StructField::not_null("id", DataType::STRING),
        StructField::nullable("ts", DataType::LONG),
        StructField::nullable("partitionpath", DataType::STRING),
        StructField::nullable("amount", DataType::DOUBLE),
    ]))
}

/// `n` orders with ids `o0..o{n-1}`, `ts` equal to `ts_base + i`, spread over two regions.
pub fn orders(n: usize, ts_base: i64) -> RowBatch {
    let rows = (0..n)
        .map(|i| {
            Row::from(vec![
                Scalar::from(format!("o{i}")),
                Scalar::Long(ts_base + i as i64),
                Scalar::from(if i % 2 == 0 { "eu" } else { "us" }),
                Scalar::Double(i as f64 * 1.5),
            ])
        })
        .collect();
    RowBatch::try_new(orders_schema(), rows).unwrap()
}

/// Everything a [`RecordingClient`] saw.
#[derive(Debug, Default)]
pub struct Recorded {
    pub created: usize,
    pub started: Vec<TransactionId>,
    pub records: Vec<CanonicalRecord>,
    pub commits: Vec<(TransactionId, usize, Option<HashMap<String, String>>)>,
    pub closes: usize,
}

/// Creates in-memory clients that fail the configured record keys and record every call.
#[derive(Debug, Default)]
pub struct RecordingFactory {
    pub recorded: Arc<Mutex<Recorded>>,
    pub failing_keys: HashSet<String>,
    pub reject_commit: bool,
}

impl RecordingFactory {
    pub fn failing(keys: &[&str]) -> Self {
        Self {
            failing_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }
}

impl TransactionClientFactory for RecordingFactory {
    fn create(
        &self,
        _engine: &dyn Engine,
        _context: ClientContext,
    ) -> TableResult<Box<dyn TransactionClient>> {
        self.recorded.lock().unwrap().created += 1;
        Ok(Box::new(RecordingClient {
            recorded: self.recorded.clone(),
            failing_keys: self.failing_keys.clone(),
            reject_commit: self.reject_commit,
        }))
    }
}

pub struct RecordingClient {
    recorded: Arc<Mutex<Recorded>>,
    failing_keys: HashSet<String>,
    reject_commit: bool,
}

impl TransactionClient for RecordingClient {
    fn start_transaction(&mut self) -> TableResult<TransactionId> {
        let txn = TransactionId::now();
        self.recorded.lock().unwrap().started.push(txn.clone());
        Ok(txn)
    }

    fn perform_operation(
        &mut self,
        _operation: OperationKind,
        records: Vec<CanonicalRecord>,
        _txn: &TransactionId,
    ) -> TableResult<Vec<WriteOutcome>> {
        let outcomes = records
            .iter()
            .map(|r| {
                if self.failing_keys.contains(r.record_key()) {
                    WriteOutcome::failure(&r.key, "injected failure")
                } else {
                    WriteOutcome::success(&r.key)
                }
            })
            .collect();
        self.recorded.lock().unwrap().records.extend(records);
        Ok(outcomes)
    }

    fn commit(
        &mut self,
        txn: &TransactionId,
        outcomes: Vec<WriteOutcome>,
        metadata: Option<HashMap<String, String>>,
    ) -> TableResult<bool> {
        self.recorded
            .lock()
            .unwrap()
            .commits
            .push((txn.clone(), outcomes.len(), metadata));
        Ok(!self.reject_commit)
    }

    fn close(&mut self) -> TableResult<()> {
        self.recorded.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// A catalog that records descriptors and answers with a fixed result.
#[derive(Debug)]
pub struct RecordingCatalog {
    pub calls: Mutex<Vec<SyncDescriptor>>,
    pub result: Result<bool, String>,
}

impl RecordingCatalog {
    pub fn new(result: Result<bool, String>) -> Self {
        Self {
            calls: Mutex::new(vec![]),
            result,
        }
    }
}

impl CatalogPublisher for RecordingCatalog {
    fn sync_table(&self, descriptor: &SyncDescriptor) -> TableResult<bool> {
        self.calls.lock().unwrap().push(descriptor.clone());
        self.result.clone().map_err(Error::catalog_sync)
    }
}
