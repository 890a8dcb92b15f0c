//! Runs the record pipeline on the executor's blocking pool, one chunk of rows per task.

use std::sync::Arc;

use futures::future::try_join_all;
use itertools::Itertools;
use tracing::debug;

use crate::engine::default::executor::TaskExecutor;
use crate::pipeline::{RecordPipeline, RowProcessor};
use crate::record::CanonicalRecord;
use crate::value::Row;
use crate::TableResult;

/// Rows handed to a single blocking task unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A [`RowProcessor`] that converts chunks of rows concurrently. Records come back in input
/// order, and the first failing chunk fails the whole batch.
#[derive(Debug)]
pub struct ParallelRowProcessor<E: TaskExecutor> {
    task_executor: Arc<E>,
    chunk_size: usize,
}

impl<E: TaskExecutor> ParallelRowProcessor<E> {
    pub(crate) fn new(task_executor: Arc<E>) -> Self {
        Self {
            task_executor,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the number of rows converted by each task. Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl<E: TaskExecutor> RowProcessor for ParallelRowProcessor<E> {
    fn process(
        &self,
        pipeline: Arc<RecordPipeline>,
        rows: Vec<Row>,
    ) -> TableResult<Vec<CanonicalRecord>> {
        if rows.len() <= self.chunk_size {
            return pipeline.process_rows(rows);
        }
        let mut tasks = Vec::with_capacity(rows.len().div_ceil(self.chunk_size));
        for chunk in &rows.into_iter().chunks(self.chunk_size) {
            let chunk: Vec<Row> = chunk.collect();
            let pipeline = pipeline.clone();
            tasks.push(
                self.task_executor
                    .spawn_blocking(move || pipeline.process_rows(chunk)),
            );
        }
        debug!(tasks = tasks.len(), "running record pipeline in parallel");
        let results = self.task_executor.block_on(try_join_all(tasks))??;
        let records = results.into_iter().process_results(|chunks| {
            chunks.flatten().collect::<Vec<CanonicalRecord>>()
        })?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::engine::default::executor::tokio::TokioBackgroundExecutor;
    use crate::keygen::SimpleKeyGenerator;
    use crate::options::{
        resolve_options, OptionScope, PATH_KEY, RECORDKEY_FIELD_KEY, TABLE_NAME_KEY,
    };
    use crate::record::CanonicalSchema;
    use crate::schema::{DataType, StructField, StructType};
    use crate::value::Scalar;
    use crate::Error;

    fn pipeline() -> Arc<RecordPipeline> {
        let schema = Arc::new(StructType::new_unchecked([
            StructField::not_null("id", DataType::STRING),
            StructField::nullable("ts", DataType::LONG),
            StructField::nullable("partitionpath", DataType::STRING),
        ]));
        let options = resolve_options(
            &HashMap::from([
                (PATH_KEY.to_string(), "/t".to_string()),
                (TABLE_NAME_KEY.to_string(), "t".to_string()),
                (RECORDKEY_FIELD_KEY.to_string(), "id".to_string()),
            ]),
            OptionScope::Write,
        )
        .unwrap();
        let canonical = Arc::new(CanonicalSchema::try_new("t", schema).unwrap());
        let key_generator = Arc::new(SimpleKeyGenerator::try_from_options(&options).unwrap());
        Arc::new(RecordPipeline::try_new(canonical, &options, key_generator).unwrap())
    }

    fn rows(n: i64) -> Vec<Row> {
        (0..n)
            .map(|i| {
                Row::from(vec![
                    Scalar::from(format!("k{i}")),
                    Scalar::Long(i),
                    Scalar::from(format!("p{}", i % 3)),
                ])
            })
            .collect()
    }

    #[test]
    fn preserves_input_order_across_chunks() {
        let processor =
            ParallelRowProcessor::new(Arc::new(TokioBackgroundExecutor::new())).with_chunk_size(7);
        let records = processor.process(pipeline(), rows(100)).unwrap();
        assert_eq!(records.len(), 100);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.record_key(), format!("k{i}"));
        }
    }

    #[test]
    fn one_bad_row_fails_the_batch() {
        let processor =
            ParallelRowProcessor::new(Arc::new(TokioBackgroundExecutor::new())).with_chunk_size(4);
        let mut batch = rows(20);
        batch[13] = Row::from(vec![
            Scalar::from("k13"),
            Scalar::from("not a long"),
            Scalar::from("p"),
        ]);
        let err = processor.process(pipeline(), batch).unwrap_err();
        assert!(matches!(err, Error::SchemaConversion(_)));
    }
}
