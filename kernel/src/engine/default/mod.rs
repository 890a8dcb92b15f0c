//! # The Default Engine
//!
//! The default implementation of [`Engine`] is [`DefaultEngine`].
//!
//! Storage goes through [`object_store`] with asynchronous IO, and the record pipeline runs on
//! blocking threads. Both are driven by a [`TaskExecutor`]; read more in the [executor] module.

use std::sync::Arc;

use object_store::DynObjectStore;

use self::executor::TaskExecutor;
use self::filesystem::ObjectStoreStorageHandler;
use self::processor::ParallelRowProcessor;
use crate::metrics::MetricsReporter;
use crate::pipeline::RowProcessor;
use crate::{Engine, StorageHandler};

pub mod executor;
pub mod filesystem;
pub mod processor;

#[derive(Debug)]
pub struct DefaultEngine<E: TaskExecutor> {
    object_store: Arc<DynObjectStore>,
    task_executor: Arc<E>,
    storage: Arc<ObjectStoreStorageHandler<E>>,
    processor: Arc<ParallelRowProcessor<E>>,
    metrics_reporter: Option<Arc<dyn MetricsReporter>>,
}

impl DefaultEngine<executor::tokio::TokioBackgroundExecutor> {
    /// Create a new [`DefaultEngine`] instance backed by a [`TokioBackgroundExecutor`].
    ///
    /// [`TokioBackgroundExecutor`]: executor::tokio::TokioBackgroundExecutor
    pub fn new(object_store: Arc<DynObjectStore>) -> Self {
        Self::new_with_executor(
            object_store,
            Arc::new(executor::tokio::TokioBackgroundExecutor::new()),
        )
    }
}

impl<E: TaskExecutor> DefaultEngine<E> {
    /// Create a new [`DefaultEngine`] instance
    ///
    /// # Parameters
    ///
    /// - `object_store`: The object store to use.
    /// - `task_executor`: Used to spawn async IO tasks and blocking pipeline work. See
    ///   [executor::TaskExecutor].
    pub fn new_with_executor(object_store: Arc<DynObjectStore>, task_executor: Arc<E>) -> Self {
        Self {
            storage: Arc::new(ObjectStoreStorageHandler::new(
                object_store.clone(),
                task_executor.clone(),
                None,
            )),
            processor: Arc::new(ParallelRowProcessor::new(task_executor.clone())),
            object_store,
            task_executor,
            metrics_reporter: None,
        }
    }

    /// Report storage and write metrics to `reporter`.
    pub fn with_metrics_reporter(mut self, reporter: Arc<dyn MetricsReporter>) -> Self {
        self.storage = Arc::new(ObjectStoreStorageHandler::new(
            self.object_store.clone(),
            self.task_executor.clone(),
            Some(reporter.clone()),
        ));
        self.metrics_reporter = Some(reporter);
        self
    }

    /// Convert `chunk_size` rows per pipeline task.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.processor = Arc::new(
            ParallelRowProcessor::new(self.task_executor.clone()).with_chunk_size(chunk_size),
        );
        self
    }

    pub fn object_store(&self) -> Arc<DynObjectStore> {
        self.object_store.clone()
    }
}

impl<E: TaskExecutor> Engine for DefaultEngine<E> {
    fn storage_handler(&self) -> Arc<dyn StorageHandler> {
        self.storage.clone()
    }

    fn row_processor(&self) -> Arc<dyn RowProcessor> {
        self.processor.clone()
    }

    fn get_metrics_reporter(&self) -> Option<Arc<dyn MetricsReporter>> {
        self.metrics_reporter.clone()
    }
}
