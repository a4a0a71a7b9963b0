//! Anvil, a from-scratch concurrent HTTP/1.1 server.
//!
//! No HTTP framework anywhere: requests are parsed by hand, responses are
//! serialized by hand, and everything in between is explicit. The
//! interesting parts are the concurrency core, not the endpoints:
//!
//! - **`server`**: accept loop → bounded task queue → fixed worker pool,
//!   with graceful shutdown
//! - **`http`**: the hand-rolled parser and responder
//! - **`router`**: exact method + path dispatch
//! - **`metrics`**: per-endpoint rolling latency windows with percentiles
//! - **`jobs`**: the asynchronous job manager (priority queues per
//!   resource class, concurrency caps, deadlines, cooperative cancellation
//!   and crash-safe persistence)
//! - **`handlers`**: the endpoint catalog wired up in `main`
//!
//! # Example
//!
//! ```ignore
//! use anvil::config::Config;
//! use anvil::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::new(Config::load());
//!     server.register("GET", "/ping", std::sync::Arc::new(anvil::handlers::basic::ping));
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown(std::time::Duration::from_secs(30)).await
//! }
//! ```

pub mod config;
pub mod handlers;
pub mod http;
pub mod jobs;
pub mod metrics;
pub mod router;
pub mod server;
