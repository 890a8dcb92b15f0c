//! The default engine talks to object stores through async IO, but the data source API is
//! synchronous. The [`TaskExecutor`] bridges the two: it runs storage futures to completion and
//! moves CPU-bound pipeline work onto blocking threads.
//!
//! Behind the `tokio` feature flag we provide both a single-threaded executor that owns its
//! runtime on a background thread and a multi-threaded executor that borrows an existing runtime.
use futures::{future::BoxFuture, Future};

use crate::TableResult;

/// An executor that can be used to run async tasks. This is used by IO functions and the row
/// processor of the `DefaultEngine`.
///
/// This must be capable of running within an async context and running futures on another
/// thread. This could be a multi-threaded runtime, like Tokio's, or a single-threaded runtime on
/// a background thread.
pub trait TaskExecutor: Send + Sync + 'static {
    /// Block on the given future, returning its output.
    ///
    /// This must NOT panic if called within an async context, so it can't be implemented by
    /// `tokio::runtime::Runtime::block_on`. Fails if the executor itself has shut down.
    fn block_on<T>(&self, task: T) -> TableResult<T::Output>
    where
        T: Future + Send + 'static,
        T::Output: Send + 'static;

    /// Run `task` on a thread where blocking is allowed. The returned future may be awaited
    /// through [`TaskExecutor::block_on`].
    fn spawn_blocking<T, R>(&self, task: T) -> BoxFuture<'static, TableResult<R>>
    where
        T: FnOnce() -> R + Send + 'static,
        R: Send + 'static;
}

#[cfg(any(feature = "tokio", test))]
pub mod tokio {
    use std::sync::mpsc::channel;

    use futures::TryFutureExt;
    use futures::{future::BoxFuture, Future};
    use tokio::runtime::RuntimeFlavor;
    use tokio::sync::mpsc::error::TrySendError;
    use tracing::error;

    use super::TaskExecutor;
    use crate::{Error, TableResult};

    /// A [`TaskExecutor`] that uses the tokio single-threaded runtime in a background thread to
    /// service tasks.
    #[derive(Debug)]
    pub struct TokioBackgroundExecutor {
        sender: tokio::sync::mpsc::Sender<BoxFuture<'static, ()>>,
        _thread: std::thread::JoinHandle<()>,
    }

    impl Default for TokioBackgroundExecutor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TokioBackgroundExecutor {
        pub fn new() -> Self {
            let (sender, mut receiver) = tokio::sync::mpsc::channel::<BoxFuture<'_, ()>>(50);
            let thread = std::thread::spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        // dropping the receiver makes every later send fail
                        error!("failed to start background tokio runtime: {e}");
                        return;
                    }
                };
                rt.block_on(async move {
                    while let Some(task) = receiver.recv().await {
                        tokio::task::spawn(task);
                    }
                });
            });
            Self {
                sender,
                _thread: thread,
            }
        }

        fn send_future(&self, mut fut: BoxFuture<'static, ()>) -> TableResult<()> {
            // `blocking_send()` calls `block_on` internally and panics inside an async context
            loop {
                match self.sender.try_send(fut) {
                    Ok(()) => return Ok(()),
                    Err(TrySendError::Full(original)) => {
                        std::thread::yield_now();
                        fut = original;
                    }
                    Err(TrySendError::Closed(_)) => {
                        return Err(Error::internal_error(
                            "TokioBackgroundExecutor channel closed",
                        ))
                    }
                }
            }
        }
    }

    impl TaskExecutor for TokioBackgroundExecutor {
        fn block_on<T>(&self, task: T) -> TableResult<T::Output>
        where
            T: Future + Send + 'static,
            T::Output: Send + 'static,
        {
            // Spawn the future on the runtime and send the result back over a channel, since
            // `Runtime::block_on` panics inside an async context.
            let (sender, receiver) = channel::<T::Output>();
            self.send_future(Box::pin(async move {
                let task_output = task.await;
                sender.send(task_output).ok();
            }))?;
            receiver
                .recv()
                .map_err(|_| Error::internal_error("TokioBackgroundExecutor has crashed"))
        }

        fn spawn_blocking<T, R>(&self, task: T) -> BoxFuture<'static, TableResult<R>>
        where
            T: FnOnce() -> R + Send + 'static,
            R: Send + 'static,
        {
            // spawned when polled, which happens on the background runtime
            Box::pin(async move {
                tokio::task::spawn_blocking(task)
                    .await
                    .map_err(Error::join_failure)
            })
        }
    }

    /// A [`TaskExecutor`] that uses the tokio multi-threaded runtime. You can create one based on
    /// a handle to an existing runtime, so it can share the runtime with other parts of your
    /// application.
    #[derive(Debug)]
    pub struct TokioMultiThreadExecutor {
        handle: tokio::runtime::Handle,
    }

    impl TokioMultiThreadExecutor {
        /// Fails with [`Error::Unsupported`] unless `handle` belongs to a multi-threaded runtime.
        pub fn try_new(handle: tokio::runtime::Handle) -> TableResult<Self> {
            if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
                return Err(Error::unsupported(
                    "TokioMultiThreadExecutor must be created with a multi-threaded runtime",
                ));
            }
            Ok(Self { handle })
        }
    }

    impl TaskExecutor for TokioMultiThreadExecutor {
        // `block_on` uses `block_in_place`; if concurrent `block_on` calls exceed tokio's
        // `max_blocking_threads`, this can deadlock.
        fn block_on<T>(&self, task: T) -> TableResult<T::Output>
        where
            T: Future + Send + 'static,
            T::Output: Send + 'static,
        {
            let (sender, receiver) = channel::<T::Output>();
            self.handle.spawn(async move {
                let task_output = task.await;
                sender.send(task_output).ok();
            });
            // let the runtime move tasks off this worker's local queue while we wait
            tokio::task::block_in_place(|| {
                receiver
                    .recv()
                    .map_err(|_| Error::internal_error("TokioMultiThreadExecutor has crashed"))
            })
        }

        fn spawn_blocking<T, R>(&self, task: T) -> BoxFuture<'static, TableResult<R>>
        where
            T: FnOnce() -> R + Send + 'static,
            R: Send + 'static,
        {
            Box::pin(self.handle.spawn_blocking(task).map_err(Error::join_failure))
        }
    }

    #[cfg(test)]
    mod tests {
        use std::sync::Arc;
        use std::time::Duration;

        use super::*;

        fn check_executor(executor: impl TaskExecutor) {
            let result = executor
                .block_on(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    2 + 2
                })
                .unwrap();
            assert_eq!(result, 4);

            let blocking = executor.spawn_blocking(|| 6 * 7);
            assert_eq!(executor.block_on(blocking).unwrap().unwrap(), 42);
        }

        #[test]
        fn tokio_background_executor() {
            check_executor(TokioBackgroundExecutor::new());
        }

        #[tokio::test]
        async fn background_executor_inside_async_context() {
            let executor = TokioBackgroundExecutor::new();
            assert_eq!(executor.block_on(async { 1 }).unwrap(), 1);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
        async fn tokio_multi_thread_executor() {
            let executor =
                TokioMultiThreadExecutor::try_new(tokio::runtime::Handle::current()).unwrap();
            check_executor(executor);
        }

        #[tokio::test]
        async fn multi_thread_executor_rejects_current_thread_runtime() {
            let err = TokioMultiThreadExecutor::try_new(tokio::runtime::Handle::current())
                .unwrap_err();
            assert!(matches!(err, Error::Unsupported(_)));
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn nested_block_on_does_not_deadlock() {
            let executor = Arc::new(
                TokioMultiThreadExecutor::try_new(tokio::runtime::Handle::current()).unwrap(),
            );
            let executor_clone = executor.clone();
            let (tx, rx) = channel::<i32>();

            let handle = std::thread::spawn(move || {
                let result = executor
                    .block_on(async move {
                        let inner = executor_clone
                            .block_on(async {
                                tokio::time::sleep(Duration::from_millis(1)).await;
                                42
                            })
                            .unwrap();
                        inner + 1
                    })
                    .unwrap();
                tx.send(result).ok();
            });

            let result = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("timed out, likely deadlock in block_on");
            assert_eq!(result, 43);
            handle.join().expect("thread panicked");
        }
    }
}
