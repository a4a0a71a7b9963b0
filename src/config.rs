use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, loaded from the environment with sensible
/// defaults. Every knob has an `ANVIL_`-prefixed variable.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (`ANVIL_LISTEN`).
    pub listen_addr: String,
    /// Worker pool size (`ANVIL_WORKERS`).
    pub pool_size: usize,
    /// Connection task queue capacity (`ANVIL_QUEUE_CAPACITY`).
    pub queue_capacity: usize,
    /// Maximum combined request-head bytes before a 400.
    pub max_header_bytes: usize,
    /// Per-class job ready-queue cap (`ANVIL_JOB_QUEUE_SIZE`).
    pub job_queue_size: usize,
    /// Concurrent CPU jobs (`ANVIL_CPU_CONCURRENCY`).
    pub cpu_concurrency: usize,
    /// Concurrent IO jobs (`ANVIL_IO_CONCURRENCY`).
    pub io_concurrency: usize,
    /// CPU job deadline (`ANVIL_CPU_TIMEOUT_SECS`).
    pub cpu_timeout: Duration,
    /// IO job deadline (`ANVIL_IO_TIMEOUT_SECS`).
    pub io_timeout: Duration,
    /// Job snapshot file (`ANVIL_JOBS_FILE`; empty string disables).
    pub persistence_file: Option<PathBuf>,
    /// Directory the file-oriented handlers operate in (`ANVIL_FILES_DIR`).
    pub files_dir: PathBuf,
    /// Deadline for graceful shutdown (`ANVIL_SHUTDOWN_TIMEOUT_SECS`).
    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn load() -> Self {
        let defaults = Self::default();

        Self {
            listen_addr: env_string("ANVIL_LISTEN", defaults.listen_addr),
            pool_size: env_usize("ANVIL_WORKERS", defaults.pool_size),
            queue_capacity: env_usize("ANVIL_QUEUE_CAPACITY", defaults.queue_capacity),
            max_header_bytes: defaults.max_header_bytes,
            job_queue_size: env_usize("ANVIL_JOB_QUEUE_SIZE", defaults.job_queue_size),
            cpu_concurrency: env_usize("ANVIL_CPU_CONCURRENCY", defaults.cpu_concurrency),
            io_concurrency: env_usize("ANVIL_IO_CONCURRENCY", defaults.io_concurrency),
            cpu_timeout: env_secs("ANVIL_CPU_TIMEOUT_SECS", defaults.cpu_timeout),
            io_timeout: env_secs("ANVIL_IO_TIMEOUT_SECS", defaults.io_timeout),
            persistence_file: env_optional_path("ANVIL_JOBS_FILE", defaults.persistence_file),
            files_dir: env_string(
                "ANVIL_FILES_DIR",
                defaults.files_dir.display().to_string(),
            )
            .into(),
            shutdown_timeout: env_secs("ANVIL_SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            pool_size: 20,
            queue_capacity: 1000,
            max_header_bytes: 1 << 20,
            job_queue_size: 1000,
            cpu_concurrency: 4,
            io_concurrency: 10,
            cpu_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            persistence_file: Some(PathBuf::from("jobs.json")),
            files_dir: PathBuf::from("data"),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

fn env_string(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_optional_path(name: &str, default: Option<PathBuf>) -> Option<PathBuf> {
    match std::env::var(name) {
        Ok(value) if value.is_empty() => None,
        Ok(value) => Some(PathBuf::from(value)),
        Err(_) => default,
    }
}
