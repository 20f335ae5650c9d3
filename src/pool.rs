//! Bounded pool of long-running workers.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs worker futures on the tokio runtime, at most `capacity` at a time.
///
/// Workers are expected to watch the pool's cancellation token; `shutdown`
/// cancels it and waits for every worker to return.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(capacity: usize, cancel: CancellationToken) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            cancel,
        }
    }

    pub fn spawn<F>(&mut self, worker: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            worker.await;
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancels the workers and waits for all of them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let mut stopped = 0;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(()) => stopped += 1,
                Err(e) => error!("Worker failed: {e}"),
            }
        }
        info!("{stopped} workers stopped");
    }
}
