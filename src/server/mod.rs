//! Server core: the connection pipeline.
//!
//! Accept loop → bounded task queue → worker pool → parser → router →
//! responder, with graceful shutdown. The pieces are deliberately small:
//!
//! - **`counter`**: lock-free counters (connection ids, active connections)
//! - **`queue`**: the bounded FIFO between accept loop and workers
//! - **`worker`**: the fixed pool draining that queue
//! - **`server`**: listener lifecycle, per-connection processing, shutdown

pub mod counter;
pub mod queue;
pub mod server;
pub mod worker;

pub use counter::Counter;
pub use queue::BoundedQueue;
pub use server::{ConnectionTask, Server, StatsHandle};
pub use worker::WorkerPool;
