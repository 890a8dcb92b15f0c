use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{DynObjectStore, ObjectStore, PutMode, PutOptions};
use tracing::debug;
use url::Url;

use crate::engine::default::executor::TaskExecutor;
use crate::metrics::{MetricEvent, MetricsReporter};
use crate::{Error, FileMeta, StorageHandler, TableResult};

/// A [`StorageHandler`] over any [`object_store`] backend, driven by a [`TaskExecutor`].
#[derive(Debug)]
pub struct ObjectStoreStorageHandler<E: TaskExecutor> {
    inner: Arc<DynObjectStore>,
    task_executor: Arc<E>,
    reporter: Option<Arc<dyn MetricsReporter>>,
}

impl<E: TaskExecutor> ObjectStoreStorageHandler<E> {
    pub(crate) fn new(
        store: Arc<DynObjectStore>,
        task_executor: Arc<E>,
        reporter: Option<Arc<dyn MetricsReporter>>,
    ) -> Self {
        Self {
            inner: store,
            task_executor,
            reporter,
        }
    }

    fn report(&self, event: MetricEvent) {
        if let Some(r) = &self.reporter {
            r.report(event);
        }
    }
}

fn store_path(url: &Url) -> TableResult<Path> {
    Ok(Path::from_url_path(url.path())?)
}

/// Native async implementation for list
async fn list_impl(store: Arc<DynObjectStore>, prefix_url: Url) -> TableResult<Vec<FileMeta>> {
    if !prefix_url.path().ends_with('/') {
        return Err(Error::generic(format!(
            "List prefix must be directory-like. Got: '{prefix_url}'"
        )));
    }
    let prefix = store_path(&prefix_url)?;
    let mut files: Vec<FileMeta> = store
        .list(Some(&prefix))
        .map(|meta| {
            let meta = meta?;
            let mut location = prefix_url.clone();
            location.set_path(&format!("/{}", meta.location.as_ref()));
            Ok::<_, Error>(FileMeta {
                location,
                last_modified: meta.last_modified.timestamp_millis(),
                size: meta.size,
            })
        })
        .try_collect()
        .await?;
    // object_store makes no ordering promise, and the local filesystem really is unordered
    files.sort_unstable();
    Ok(files)
}

/// Native async implementation for delete_recursive
async fn delete_recursive_impl(store: Arc<DynObjectStore>, prefix: Path) -> TableResult<u64> {
    let locations = store
        .list(Some(&prefix))
        .map_ok(|meta| meta.location)
        .boxed();
    let deleted: Vec<Path> = store.delete_stream(locations).try_collect().await?;
    Ok(deleted.len() as u64)
}

impl<E: TaskExecutor> StorageHandler for ObjectStoreStorageHandler<E> {
    fn exists(&self, path: &Url) -> TableResult<bool> {
        let store = self.inner.clone();
        let location = store_path(path)?;
        let result = self
            .task_executor
            .block_on(async move { store.head(&location).await })?;
        match result {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&self, path: &Url) -> TableResult<Bytes> {
        let start = Instant::now();
        let store = self.inner.clone();
        let location = store_path(path)?;
        let bytes = self
            .task_executor
            .block_on(async move { store.get(&location).await?.bytes().await })??;
        self.report(MetricEvent::StorageReadCompleted {
            duration: start.elapsed(),
            bytes_read: bytes.len() as u64,
        });
        Ok(bytes)
    }

    fn put(&self, path: &Url, data: Bytes, overwrite: bool) -> TableResult<()> {
        let start = Instant::now();
        let store = self.inner.clone();
        let location = store_path(path)?;
        let bytes_written = data.len() as u64;
        let mode = if overwrite {
            PutMode::Overwrite
        } else {
            PutMode::Create
        };
        let result = self.task_executor.block_on(async move {
            store
                .put_opts(&location, data.into(), PutOptions::from(mode))
                .await
        })?;
        match result {
            Ok(_) => {}
            Err(object_store::Error::AlreadyExists { .. }) => {
                return Err(Error::FileAlreadyExists(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        self.report(MetricEvent::StorageWriteCompleted {
            duration: start.elapsed(),
            bytes_written,
        });
        Ok(())
    }

    fn list(&self, prefix: &Url) -> TableResult<Vec<FileMeta>> {
        let start = Instant::now();
        let files = self
            .task_executor
            .block_on(list_impl(self.inner.clone(), prefix.clone()))??;
        self.report(MetricEvent::StorageListCompleted {
            duration: start.elapsed(),
            num_files: files.len() as u64,
        });
        Ok(files)
    }

    fn delete(&self, path: &Url) -> TableResult<()> {
        let store = self.inner.clone();
        let location = store_path(path)?;
        let result = self
            .task_executor
            .block_on(async move { store.delete(&location).await })?;
        match result {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_recursive(&self, prefix: &Url) -> TableResult<u64> {
        if !prefix.path().ends_with('/') {
            return Err(Error::generic(format!(
                "Delete prefix must be directory-like. Got: '{prefix}'"
            )));
        }
        let start = Instant::now();
        let num_files = self
            .task_executor
            .block_on(delete_recursive_impl(self.inner.clone(), store_path(prefix)?))??;
        debug!(%prefix, num_files, "deleted objects");
        self.report(MetricEvent::StorageDeleteCompleted {
            duration: start.elapsed(),
            num_files,
        });
        Ok(num_files)
    }
}

#[cfg(test)]
mod tests {
    use object_store::local::LocalFileSystem;
    use object_store::memory::InMemory;

    use super::*;
    use crate::engine::default::executor::tokio::TokioBackgroundExecutor;
    use crate::metrics::CollectingReporter;

    fn memory_handler(
        reporter: Option<Arc<dyn MetricsReporter>>,
    ) -> ObjectStoreStorageHandler<TokioBackgroundExecutor> {
        ObjectStoreStorageHandler::new(
            Arc::new(InMemory::new()),
            Arc::new(TokioBackgroundExecutor::new()),
            reporter,
        )
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn put_read_exists() {
        let storage = memory_handler(None);
        let file = url("memory:///t/a.json");
        assert!(!storage.exists(&file).unwrap());

        storage.put(&file, Bytes::from("one"), false).unwrap();
        assert!(storage.exists(&file).unwrap());
        assert_eq!(storage.read(&file).unwrap(), Bytes::from("one"));

        let err = storage.put(&file, Bytes::from("two"), false).unwrap_err();
        assert!(matches!(err, Error::FileAlreadyExists(_)));
        assert_eq!(storage.read(&file).unwrap(), Bytes::from("one"));

        storage.put(&file, Bytes::from("two"), true).unwrap();
        assert_eq!(storage.read(&file).unwrap(), Bytes::from("two"));

        let err = storage.read(&url("memory:///t/missing")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn list_is_sorted_and_scoped() {
        let storage = memory_handler(None);
        for name in ["t/c", "t/a", "t/sub/b", "other/x"] {
            storage
                .put(&url(&format!("memory:///{name}")), Bytes::new(), false)
                .unwrap();
        }
        let listed: Vec<String> = storage
            .list(&url("memory:///t/"))
            .unwrap()
            .into_iter()
            .map(|f| f.location.path().to_string())
            .collect();
        assert_eq!(listed, vec!["/t/a", "/t/c", "/t/sub/b"]);

        assert!(storage.list(&url("memory:///t")).is_err());
    }

    #[test]
    fn deletes() {
        let reporter = Arc::new(CollectingReporter::default());
        let storage = memory_handler(Some(reporter.clone()));
        for name in ["t/a", "t/sub/b", "u/c"] {
            storage
                .put(&url(&format!("memory:///{name}")), Bytes::new(), false)
                .unwrap();
        }
        storage.delete(&url("memory:///t/missing")).unwrap();
        assert_eq!(storage.delete_recursive(&url("memory:///t/")).unwrap(), 2);
        assert!(storage.list(&url("memory:///t/")).unwrap().is_empty());
        assert_eq!(storage.list(&url("memory:///u/")).unwrap().len(), 1);
        assert!(reporter
            .events()
            .iter()
            .any(|e| matches!(e, MetricEvent::StorageDeleteCompleted { num_files: 2, .. })));
    }

    #[test]
    fn local_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = ObjectStoreStorageHandler::new(
            Arc::new(LocalFileSystem::new()),
            Arc::new(TokioBackgroundExecutor::new()),
            None,
        );
        let base = Url::from_directory_path(tmp.path()).unwrap();
        for name in ["b", "a", "dir/c"] {
            storage
                .put(&base.join(name).unwrap(), Bytes::from(name), false)
                .unwrap();
        }
        let listed = storage.list(&base).unwrap();
        let names: Vec<&str> = listed
            .iter()
            .map(|f| f.location.path().trim_start_matches(base.path()))
            .collect();
        assert_eq!(names, vec!["a", "b", "dir/c"]);
        assert_eq!(listed[0].size, 1);
        assert_eq!(storage.delete_recursive(&base).unwrap(), 3);
    }
}
