use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::http::parser::{parse_request, ParseError};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::jobs::{JobManager, JobManagerConfig};
use crate::metrics::MetricsRegistry;
use crate::router::{Handler, Router};
use crate::server::counter::Counter;
use crate::server::queue::BoundedQueue;
use crate::server::worker::WorkerPool;

/// Deadline for reading and parsing one request.
const PARSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for writing one response.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// A connection handed from the accept loop to the worker pool.
pub struct ConnectionTask {
    pub stream: TcpStream,
    pub id: i64,
    pub enqueued_at: Instant,
}

#[derive(Debug, Error)]
enum ReadError {
    /// EOF before the client sent anything. Logged quietly.
    #[error("connection closed by client")]
    ClientDisconnected,
    /// EOF in the middle of a request.
    #[error("unexpected end of request")]
    UnexpectedEof,
    #[error(transparent)]
    Parse(ParseError),
    #[error("reading request: {0}")]
    Io(#[from] std::io::Error),
}

struct ServerInner {
    config: Config,
    router: Arc<Router>,
    metrics: Arc<MetricsRegistry>,
    task_queue: Arc<BoundedQueue<ConnectionTask>>,
    worker_pool: WorkerPool,
    conn_counter: Arc<Counter>,
    active_conns: Arc<Counter>,
    busy_workers: Arc<Counter>,
    job_manager: Arc<JobManager>,
    shutdown: CancellationToken,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

/// The HTTP server: listener, bounded task queue, worker pool, router and
/// job manager, wired together.
///
/// Every accepted socket becomes a [`ConnectionTask`] and goes through the
/// bounded queue; when the queue is full the connection is dropped on the
/// floor (backpressure is drop-new, never block-accept). A fixed pool of
/// workers drains the queue; each worker owns one connection end to end.
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let job_manager = Arc::new(JobManager::new(JobManagerConfig {
            max_queue_size: config.job_queue_size,
            cpu_concurrency: config.cpu_concurrency,
            io_concurrency: config.io_concurrency,
            cpu_timeout: config.cpu_timeout,
            io_timeout: config.io_timeout,
            persistence_file: config.persistence_file.clone(),
        }));

        let inner = Arc::new(ServerInner {
            router: Arc::new(Router::new()),
            metrics: Arc::new(MetricsRegistry::new()),
            task_queue: Arc::new(BoundedQueue::new(config.queue_capacity)),
            worker_pool: WorkerPool::new(config.pool_size),
            conn_counter: Arc::new(Counter::new()),
            active_conns: Arc::new(Counter::new()),
            busy_workers: Arc::new(Counter::new()),
            job_manager,
            shutdown: CancellationToken::new(),
            accept_handle: Mutex::new(None),
            local_addr: Mutex::new(None),
            config,
        });

        Self { inner }
    }

    /// Registers a handler for an exact method + path.
    pub fn register(&self, method: &str, path: &str, handler: Handler) {
        self.inner.router.register(method, path, handler);
    }

    pub fn job_manager(&self) -> Arc<JobManager> {
        Arc::clone(&self.inner.job_manager)
    }

    /// The address actually bound, available after `start`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock().unwrap()
    }

    /// Binds the listener, starts the worker pool and job dispatcher, and
    /// spawns the accept loop.
    pub async fn start(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.inner.config.listen_addr)
            .await
            .with_context(|| format!("binding {}", self.inner.config.listen_addr))?;

        let addr = listener.local_addr().context("reading bound address")?;
        *self.inner.local_addr.lock().unwrap() = Some(addr);
        tracing::info!(addr = %addr, "Listening");

        self.inner.job_manager.start();

        let pool_inner = Arc::clone(&self.inner);
        self.inner
            .worker_pool
            .start(Arc::clone(&self.inner.task_queue), move |task| {
                let inner = Arc::clone(&pool_inner);
                async move {
                    process_connection(inner, task).await;
                }
            });

        let accept_inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            accept_loop(accept_inner, listener).await;
        });
        *self.inner.accept_handle.lock().unwrap() = Some(handle);

        Ok(())
    }

    /// Gracefully stops the server: the accept loop unblocks and drops the
    /// listener, the task queue closes, workers finish their in-flight
    /// connections, and the job manager drains. Fails if `deadline` elapses
    /// first. Calling it twice is a no-op the second time.
    pub async fn shutdown(&self, deadline: Duration) -> anyhow::Result<()> {
        tracing::info!("Shutting down");
        self.inner.shutdown.cancel();
        self.inner.task_queue.close();

        let accept_handle = self.inner.accept_handle.lock().unwrap().take();

        let inner = Arc::clone(&self.inner);
        timeout(deadline, async move {
            if let Some(handle) = accept_handle {
                let _ = handle.await;
            }
            inner.worker_pool.stop().await;
            inner.job_manager.shutdown().await;
        })
        .await
        .context("shutdown timed out")?;

        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Counters reported by `GET /status`.
    pub fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "total_connections": self.inner.conn_counter.get(),
            "active_connections": self.inner.active_conns.get(),
            "queue_size": self.inner.task_queue.size(),
        })
    }

    /// A cheap clonable view over the server's observable state, for the
    /// handlers that report it.
    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle {
            metrics: Arc::clone(&self.inner.metrics),
            task_queue: Arc::clone(&self.inner.task_queue),
            conn_counter: Arc::clone(&self.inner.conn_counter),
            active_conns: Arc::clone(&self.inner.active_conns),
            busy_workers: Arc::clone(&self.inner.busy_workers),
            pool_size: self.inner.worker_pool.size(),
        }
    }
}

/// Snapshot access to counters, queue and metrics, captured by the
/// `/status` and `/metrics` handler factories.
#[derive(Clone)]
pub struct StatsHandle {
    metrics: Arc<MetricsRegistry>,
    task_queue: Arc<BoundedQueue<ConnectionTask>>,
    conn_counter: Arc<Counter>,
    active_conns: Arc<Counter>,
    busy_workers: Arc<Counter>,
    pool_size: usize,
}

impl StatsHandle {
    pub fn server_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "total_connections": self.conn_counter.get(),
            "active_connections": self.active_conns.get(),
            "queue_size": self.task_queue.size(),
        })
    }

    pub fn worker_pool_stats(&self) -> serde_json::Value {
        let busy = self.busy_workers.get();
        serde_json::json!({
            "size": self.pool_size,
            "busy_workers": busy,
            "idle_workers": self.pool_size as i64 - busy,
        })
    }

    pub fn global_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "total_connections": self.conn_counter.get(),
            "active_connections": self.active_conns.get(),
            "queue_size": self.task_queue.size(),
            "queue_capacity": self.task_queue.capacity(),
        })
    }

    pub fn endpoint_stats(&self) -> serde_json::Value {
        self.metrics.all_stats()
    }
}

async fn accept_loop(inner: Arc<ServerInner>, listener: TcpListener) {
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => {
                tracing::info!("Accept loop stopping");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _peer)) => {
                    let id = inner.conn_counter.increment();
                    inner.active_conns.increment();

                    let task = ConnectionTask {
                        stream,
                        id,
                        enqueued_at: Instant::now(),
                    };

                    // A rejected task is dropped, which closes the socket;
                    // the accept-time increment is rolled back.
                    if !inner.task_queue.enqueue(task) {
                        tracing::warn!(conn_id = id, "Task queue full, dropping connection");
                        inner.active_conns.decrement();
                    }
                }
                Err(err) => {
                    if inner.shutdown.is_cancelled() {
                        return;
                    }
                    tracing::error!(error = %err, "Failed to accept connection");
                }
            }
        }
    }
}

/// Decrements a counter when dropped, so every exit path (panics included)
/// balances the books.
struct CounterGuard {
    counter: Arc<Counter>,
}

impl CounterGuard {
    /// Increments now, decrements on drop.
    fn enter(counter: &Arc<Counter>) -> Self {
        counter.increment();
        Self {
            counter: Arc::clone(counter),
        }
    }

    /// Decrements on drop only (the increment already happened elsewhere).
    fn release_on_drop(counter: &Arc<Counter>) -> Self {
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}

/// Handles one connection end to end: parse, route, respond.
///
/// The socket closes when `task.stream` drops, and the counter guards run
/// on every exit path, so a panic anywhere in here leaves no leaked
/// connection accounting behind.
async fn process_connection(inner: Arc<ServerInner>, task: ConnectionTask) {
    let _busy = CounterGuard::enter(&inner.busy_workers);
    let _active = CounterGuard::release_on_drop(&inner.active_conns);

    let ConnectionTask {
        mut stream,
        id,
        enqueued_at,
    } = task;

    let request = match timeout(
        PARSE_TIMEOUT,
        read_request(&mut stream, inner.config.max_header_bytes),
    )
    .await
    {
        Ok(Ok(request)) => request,
        Ok(Err(ReadError::ClientDisconnected)) => {
            tracing::debug!(conn_id = id, "Client disconnected");
            send_error(&mut stream, "connection closed by client").await;
            return;
        }
        Ok(Err(err)) => {
            tracing::warn!(conn_id = id, error = %err, "Failed to parse request");
            send_error(&mut stream, &err.to_string()).await;
            return;
        }
        Err(_elapsed) => {
            tracing::warn!(conn_id = id, "Request read timed out");
            send_error(&mut stream, "request read timed out").await;
            return;
        }
    };

    tracing::debug!(conn_id = id, method = %request.method, path = %request.path, "Request received");

    let endpoint = request.endpoint_key();
    let metrics = inner.metrics.get_or_create(&endpoint);
    metrics.record_wait_time(enqueued_at.elapsed());
    metrics.increment_active();

    let started = Instant::now();
    let router = Arc::clone(&inner.router);
    let response = match tokio::task::spawn_blocking(move || router.handle(&request)).await {
        Ok(response) => response,
        Err(_panicked) => {
            tracing::error!(conn_id = id, endpoint = %endpoint, "Handler panicked");
            Response::error(StatusCode::InternalServerError, "handler panicked")
        }
    };

    metrics.record_exec_time(started.elapsed());
    metrics.decrement_active();

    let writer = ResponseWriter::new(&response);
    if let Err(err) = writer.write_to_stream(&mut stream, WRITE_TIMEOUT).await {
        tracing::warn!(conn_id = id, error = %err, "Failed to write response");
    }
}

/// Reads until the buffer holds one complete request.
async fn read_request(stream: &mut TcpStream, max_header_bytes: usize) -> Result<Request, ReadError> {
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        // Bound the head before parsing, terminator or not: a single read
        // can deliver a complete head that is already over the limit. Only
        // the head counts, so Content-Length bodies stay unrestricted.
        let head_bytes = buffer
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .unwrap_or(buffer.len());
        if head_bytes > max_header_bytes {
            return Err(ReadError::Parse(ParseError::HeadersTooLarge(
                max_header_bytes,
            )));
        }

        match parse_request(&buffer) {
            Ok((request, _consumed)) => return Ok(request),
            Err(ParseError::Incomplete) => {}
            Err(err) => return Err(ReadError::Parse(err)),
        }

        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            if buffer.is_empty() {
                return Err(ReadError::ClientDisconnected);
            }
            return Err(ReadError::UnexpectedEof);
        }
    }
}

/// Best-effort 400; the socket may already be half closed, in which case
/// the write failure is ignored.
async fn send_error(stream: &mut TcpStream, message: &str) {
    let response = Response::error(StatusCode::BadRequest, message);
    let writer = ResponseWriter::new(&response);
    let _ = writer.write_to_stream(stream, WRITE_TIMEOUT).await;
}
