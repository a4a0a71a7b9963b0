use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::jobs::executor::{ExecuteError, TaskExecutor};
use crate::jobs::job::{Job, JobClass, JobPriority, JobStatus};
use crate::jobs::persist;

/// How often the dispatcher looks for the next runnable job. This is the
/// upper bound on pickup latency for a queued job under a free cap.
const DISPATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Step delay of the simulated fallback executor.
const SIMULATION_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("queue full")]
    QueueFull,
}

#[derive(Debug, Error)]
pub enum CancelError {
    #[error("job not found")]
    NotFound,
}

/// Tunables for the job manager.
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Per-class ready-queue cap; submissions beyond it are rejected.
    pub max_queue_size: usize,
    pub cpu_concurrency: usize,
    pub io_concurrency: usize,
    pub cpu_timeout: Duration,
    pub io_timeout: Duration,
    /// Snapshot file; `None` disables persistence.
    pub persistence_file: Option<PathBuf>,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            cpu_concurrency: 4,
            io_concurrency: 10,
            cpu_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            persistence_file: None,
        }
    }
}

struct ManagerState {
    jobs: HashMap<String, Arc<Job>>,
    queues: HashMap<JobClass, Vec<Arc<Job>>>,
    active: HashMap<JobClass, usize>,
}

/// Accepts, schedules and executes asynchronous jobs.
///
/// Jobs are bucketed into resource classes (`cpu`, `io`), each with its own
/// ready queue, concurrency cap and timeout. A single dispatcher task ticks
/// every 100 ms and starts the highest-priority queued job of any class
/// whose cap has room. Running jobs race their executor against the class
/// deadline and the client-facing cancellation handle.
///
/// Lock discipline: the manager mutex guards queues and the job map; each
/// job guards its own mutable fields. Lock order is always manager → job,
/// jobs never call back into the manager, and persistence never re-enters
/// either lock.
pub struct JobManager {
    config: JobManagerConfig,
    state: Mutex<ManagerState>,
    executor: RwLock<Option<Arc<dyn TaskExecutor>>>,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    tracker: TaskTracker,
}

impl JobManager {
    /// Creates a manager and restores any persisted job set: `running` jobs
    /// become `error("server restarted")`, `queued` jobs are re-enqueued in
    /// priority order, terminal jobs are retained for query.
    pub fn new(config: JobManagerConfig) -> Self {
        let mut jobs = HashMap::new();
        let mut queues: HashMap<JobClass, Vec<Arc<Job>>> = HashMap::new();

        if let Some(path) = &config.persistence_file {
            for mut record in persist::load_jobs(path) {
                if record.status == JobStatus::Running {
                    record.status = JobStatus::Error;
                    record.error = Some("server restarted".to_string());
                }

                let class = JobClass::classify(&record.task);
                let timeout = match class {
                    JobClass::Cpu => config.cpu_timeout,
                    JobClass::Io => config.io_timeout,
                };

                let job = Arc::new(Job::restored(
                    record.job_id.clone(),
                    record.task,
                    record.params,
                    record.priority,
                    timeout,
                    record.status,
                    record.progress,
                    record.result,
                    record.error,
                    record.created_at,
                    record.started_at,
                    record.completed_at,
                ));

                if job.status() == JobStatus::Queued {
                    queues.entry(class).or_default().push(Arc::clone(&job));
                }
                jobs.insert(record.job_id, job);
            }

            for queue in queues.values_mut() {
                queue.sort_by_key(|job| Reverse(job.priority));
            }
        }

        Self {
            config,
            state: Mutex::new(ManagerState {
                jobs,
                queues,
                active: HashMap::new(),
            }),
            executor: RwLock::new(None),
            shutdown: CancellationToken::new(),
            dispatcher: Mutex::new(None),
            tracker: TaskTracker::new(),
        }
    }

    /// Installs the task executor. Without one, jobs run a simulated
    /// progress loop instead.
    pub fn set_executor(&self, executor: Arc<dyn TaskExecutor>) {
        *self.executor.write().unwrap() = Some(executor);
    }

    /// Launches the dispatcher task. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut dispatcher = self.dispatcher.lock().unwrap();
        if dispatcher.is_some() {
            return;
        }

        let manager = Arc::clone(self);
        *dispatcher = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(DISPATCH_INTERVAL);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => return,
                    _ = tick.tick() => manager.dispatch_next(),
                }
            }
        }));

        tracing::info!("Job dispatcher started");
    }

    /// Queues a new job. Fails when the class queue is at capacity.
    pub fn submit(
        &self,
        task: &str,
        params: HashMap<String, String>,
        priority: JobPriority,
    ) -> Result<Arc<Job>, SubmitError> {
        let class = JobClass::classify(task);

        let mut state = self.state.lock().unwrap();

        let queued = state.queues.get(&class).map(|q| q.len()).unwrap_or(0);
        if queued >= self.config.max_queue_size {
            return Err(SubmitError::QueueFull);
        }

        let id = format!(
            "{}-{}",
            task,
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        let job = Arc::new(Job::new(
            id.clone(),
            task.to_string(),
            params,
            priority,
            self.class_timeout(class),
        ));

        state.jobs.insert(id, Arc::clone(&job));

        let queue = state.queues.entry(class).or_default();
        queue.push(Arc::clone(&job));
        // Stable sort: equal priorities keep submission order.
        queue.sort_by_key(|job| Reverse(job.priority));

        self.persist_locked(&state);

        tracing::info!(job_id = %job.id, task = %job.task, class = class.as_str(), "Job queued");
        Ok(job)
    }

    pub fn get_job(&self, job_id: &str) -> Option<Arc<Job>> {
        self.state.lock().unwrap().jobs.get(job_id).cloned()
    }

    /// Cancels a job. Returns `Ok(false)` (`not_cancelable`) when the job is
    /// already terminal.
    pub fn cancel_job(&self, job_id: &str) -> Result<bool, CancelError> {
        let job = self.get_job(job_id).ok_or(CancelError::NotFound)?;

        let canceled = job.cancel();

        let state = self.state.lock().unwrap();
        self.persist_locked(&state);

        if canceled {
            tracing::info!(job_id = %job.id, "Job canceled");
        }
        Ok(canceled)
    }

    /// Per-class queue statistics for the metrics endpoint.
    pub fn queue_stats(&self) -> serde_json::Value {
        let state = self.state.lock().unwrap();

        let mut stats = serde_json::Map::new();
        for class in JobClass::ALL {
            let queued = state
                .queues
                .get(&class)
                .map(|q| q.iter().filter(|j| j.status() == JobStatus::Queued).count())
                .unwrap_or(0);
            let active = state.active.get(&class).copied().unwrap_or(0);

            stats.insert(
                class.as_str().to_string(),
                serde_json::json!({
                    "queued": queued,
                    "active": active,
                    "max_concurrent": self.concurrency_cap(class),
                }),
            );
        }
        stats.insert("total_jobs".to_string(), state.jobs.len().into());

        serde_json::Value::Object(stats)
    }

    /// Stops the dispatcher, waits for running jobs and writes a final
    /// snapshot. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let dispatcher = self.dispatcher.lock().unwrap().take();
        if let Some(handle) = dispatcher {
            let _ = handle.await;
        }

        self.tracker.close();
        self.tracker.wait().await;

        let state = self.state.lock().unwrap();
        self.persist_locked(&state);
    }

    fn class_timeout(&self, class: JobClass) -> Duration {
        match class {
            JobClass::Cpu => self.config.cpu_timeout,
            JobClass::Io => self.config.io_timeout,
        }
    }

    fn concurrency_cap(&self, class: JobClass) -> usize {
        match class {
            JobClass::Cpu => self.config.cpu_concurrency,
            JobClass::Io => self.config.io_concurrency,
        }
    }

    /// One dispatch round: start the first queued job of a class with a free
    /// slot. Canceled entries are pruned from the ready queues here, so the
    /// dispatcher never picks them.
    fn dispatch_next(self: &Arc<Self>) {
        let picked = {
            let mut state = self.state.lock().unwrap();

            let mut picked = None;
            for class in JobClass::ALL {
                if state.active.get(&class).copied().unwrap_or(0) >= self.concurrency_cap(class) {
                    continue;
                }

                let Some(queue) = state.queues.get_mut(&class) else {
                    continue;
                };
                queue.retain(|job| !job.status().is_terminal());

                let Some(index) = queue.iter().position(|j| j.status() == JobStatus::Queued)
                else {
                    continue;
                };

                let job = queue.remove(index);
                let token = CancellationToken::new();
                if job.mark_running(token.clone()) {
                    *state.active.entry(class).or_insert(0) += 1;
                    picked = Some((job, class, token));
                    break;
                }
            }

            picked
        };

        if let Some((job, class, token)) = picked {
            let manager = Arc::clone(self);
            self.tracker.spawn(async move {
                manager.execute_job(job, class, token).await;
            });
        }
    }

    /// Runs one job to a terminal state: the executor result races the
    /// class deadline and the cancellation handle.
    async fn execute_job(self: Arc<Self>, job: Arc<Job>, class: JobClass, token: CancellationToken) {
        tracing::info!(job_id = %job.id, task = %job.task, class = class.as_str(), "Job running");

        let executor = self.executor.read().unwrap().clone();
        let work_job = Arc::clone(&job);
        let work_token = token.clone();
        let work = tokio::task::spawn_blocking(move || run_task(executor, work_job, work_token));

        tokio::select! {
            result = work => match result {
                Ok(Ok(map)) => job.set_result(map),
                Ok(Err(err)) => job.set_error(&err.to_string()),
                Err(_join) => job.set_error("task panicked"),
            },
            _ = tokio::time::sleep(job.timeout) => {
                // Release the executor thread, then record the deadline.
                token.cancel();
                job.mark_timeout();
            }
            _ = token.cancelled() => {
                // Client cancel: the job already transitioned to canceled.
            }
        }

        {
            let mut state = self.state.lock().unwrap();
            if let Some(active) = state.active.get_mut(&class) {
                *active = active.saturating_sub(1);
            }
            self.persist_locked(&state);
        }

        tracing::info!(job_id = %job.id, status = job.status().as_str(), "Job finished");
    }

    /// Writes the snapshot while the manager lock is held. Must not call
    /// back into the manager.
    fn persist_locked(&self, state: &ManagerState) {
        let Some(path) = &self.config.persistence_file else {
            return;
        };

        let mut records: Vec<_> = state.jobs.values().map(|job| job.snapshot()).collect();
        records.sort_by(|a, b| (a.created_at, &a.job_id).cmp(&(b.created_at, &b.job_id)));

        persist::save_jobs(path, &records);
    }
}

/// Executor invocation on the blocking thread. With no executor installed,
/// work is simulated: progress steps 0→100 by 10 with a 100 ms delay per
/// step, honoring cancellation between steps.
fn run_task(
    executor: Option<Arc<dyn TaskExecutor>>,
    job: Arc<Job>,
    token: CancellationToken,
) -> Result<serde_json::Map<String, serde_json::Value>, ExecuteError> {
    if let Some(executor) = executor {
        return executor.execute(&token, &job.task, &job.params);
    }

    for progress in (0..=100).step_by(10) {
        if token.is_cancelled() {
            return Err(ExecuteError::Canceled);
        }
        job.update_progress(progress);
        std::thread::sleep(SIMULATION_STEP);
    }

    let mut result = serde_json::Map::new();
    result.insert("task".into(), job.task.clone().into());
    result.insert("completed".into(), true.into());
    result.insert("message".into(), "job completed successfully (simulated)".into());
    Ok(result)
}
