//! Request handlers.
//!
//! Every handler is a pure `fn(&Request) -> Response`; the ones that need
//! shared state (counters, the job manager, the files directory) are
//! produced by factory functions that capture it. Handlers run on blocking
//! threads, so synchronous file IO and CPU-heavy loops are fine here.
//!
//! - **`basic`**: hello/ping/echo/time/help plus small utility endpoints
//! - **`cpu`**: compute-heavy endpoints (primes, pi, mandelbrot, matrices)
//! - **`io`**: file-oriented endpoints rooted in the configured data dir
//! - **`jobs`**: the `/jobs/*` API over the job manager

pub mod basic;
pub mod cpu;
pub mod io;
pub mod jobs;

use std::path::{Path, PathBuf};

/// Advances a linear congruential generator and returns the next value.
pub(crate) fn lcg_next(seed: &mut u64) -> u64 {
    *seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
    *seed
}

/// Resolves `name` inside the files directory, refusing path traversal.
pub(crate) fn file_path(files_dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains("..") || name.contains('/') {
        return None;
    }
    Some(files_dir.join(name))
}
