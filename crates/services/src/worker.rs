//! A long-lived runtime that drives `CollectionService` from synchronous
//! callers (the CLI, or a UI thread) without building a runtime per call.

use shared::{CollectionError, CollectionResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::collection_service::CollectionService;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct CollectionWorker {
    runtime: Runtime,
    service: Arc<CollectionService>,
}

impl CollectionWorker {
    pub fn start(service: CollectionService, worker_threads: usize) -> CollectionResult<Self> {
        let threads = worker_threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("collection-worker")
            .enable_all()
            .build()?;
        info!(threads, "collection worker started");

        Ok(Self {
            runtime,
            service: Arc::new(service),
        })
    }

    pub fn service(&self) -> Arc<CollectionService> {
        self.service.clone()
    }

    /// Schedule `job` on the worker. The receiver yields the job's output, or
    /// an error if the job panicked or the worker shut down first.
    pub fn submit<F, Fut, T>(&self, job: F) -> oneshot::Receiver<T>
    where
        F: FnOnce(Arc<CollectionService>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let future = job(self.service.clone());
        self.runtime.spawn(async move {
            if tx.send(future.await).is_err() {
                debug!("collection job finished after its caller gave up");
            }
        });
        rx
    }

    /// Run `job` and block until it completes.
    ///
    /// Must not be called from inside an async context.
    pub fn run<F, Fut, T>(&self, job: F) -> CollectionResult<T>
    where
        F: FnOnce(Arc<CollectionService>) -> Fut,
        Fut: Future<Output = CollectionResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(job).blocking_recv().map_err(|_| {
            CollectionError::WorkerUnavailable("job ended without a result".to_string())
        })?
    }

    pub fn shutdown(self) {
        self.runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        info!("collection worker stopped");
    }
}
