use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::server::queue::BoundedQueue;

const DEFAULT_POOL_SIZE: usize = 10;

/// Fixed-size pool of long-lived workers draining a [`BoundedQueue`].
///
/// Workers never poll: an idle worker parks on the queue's not-empty event
/// and the pool's stop token, whichever fires first. A panicking task is
/// caught and logged; the worker keeps running.
pub struct WorkerPool {
    size: usize,
    stop: CancellationToken,
    stopped: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Creates a pool of `size` workers (clamped to at least 1).
    pub fn new(size: usize) -> Self {
        let size = if size == 0 { DEFAULT_POOL_SIZE } else { size };

        Self {
            size,
            stop: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            handles: Mutex::new(Vec::with_capacity(size)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Launches all workers against `queue`, invoking `process` for each
    /// dequeued item.
    pub fn start<T, F, Fut>(&self, queue: Arc<BoundedQueue<T>>, process: F)
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut handles = self.handles.lock().unwrap();

        for id in 0..self.size {
            let queue = Arc::clone(&queue);
            let process = process.clone();
            let stop = self.stop.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(id, queue, process, stop).await;
            }));
        }

        tracing::info!(workers = self.size, "Worker pool started");
    }

    /// Signals all workers and waits for them to finish. Idempotent; a
    /// second call returns immediately.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.stop.cancel();

        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop<T, F, Fut>(
    id: usize,
    queue: Arc<BoundedQueue<T>>,
    process: F,
    stop: CancellationToken,
) where
    F: Fn(T) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        if stop.is_cancelled() {
            return;
        }

        if let Some(item) = queue.dequeue() {
            // Task-local cleanup (guards, socket drops) runs during unwind,
            // so a panic only costs the one task.
            if AssertUnwindSafe(process(item)).catch_unwind().await.is_err() {
                tracing::error!(worker = id, "Task panicked");
            }
            continue;
        }

        tokio::select! {
            _ = stop.cancelled() => return,
            _ = queue.notified() => {}
        }
    }
}
