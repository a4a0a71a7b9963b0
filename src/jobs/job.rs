use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a job. The four right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
    Canceled,
    Timeout,
}

impl JobStatus {
    /// True for states that allow no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Error | JobStatus::Canceled | JobStatus::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Canceled => "canceled",
            JobStatus::Timeout => "timeout",
        }
    }
}

/// Three-level ordering used to pick among queued jobs within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

impl JobPriority {
    /// Parses the `prio` query value; anything unrecognized is `Normal`.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("low") => JobPriority::Low,
            Some("high") => JobPriority::High,
            _ => JobPriority::Normal,
        }
    }
}

/// Resource class governing concurrency caps and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobClass {
    Cpu,
    Io,
}

impl JobClass {
    /// Infers the class from the task name. The compute tasks are CPU;
    /// everything else is treated as IO.
    pub fn classify(task: &str) -> Self {
        match task {
            "isprime" | "factor" | "pi" | "mandelbrot" | "matrixmul" | "fibonacci" => JobClass::Cpu,
            _ => JobClass::Io,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobClass::Cpu => "cpu",
            JobClass::Io => "io",
        }
    }

    pub const ALL: [JobClass; 2] = [JobClass::Cpu, JobClass::Io];
}

/// Mutable job fields, guarded by the per-job lock.
struct JobState {
    status: JobStatus,
    progress: u8,
    eta_ms: i64,
    result: Option<serde_json::Map<String, serde_json::Value>>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobState")
            .field("status", &self.status)
            .field("progress", &self.progress)
            .field("eta_ms", &self.eta_ms)
            .field("result", &self.result)
            .field("error", &self.error)
            .field("started_at", &self.started_at)
            .field("completed_at", &self.completed_at)
            .finish()
    }
}

/// An asynchronous job.
///
/// Identity and submission data are immutable; everything that changes over
/// the lifecycle sits behind one mutex so observers see exactly one state
/// transition at a time. Transition methods are guarded: once a terminal
/// state is reached, later calls are no-ops, which keeps a late executor
/// result from overwriting a timeout or cancellation.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub task: String,
    pub params: HashMap<String, String>,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    pub timeout: Duration,
    state: Mutex<JobState>,
}

impl Job {
    pub fn new(
        id: String,
        task: String,
        params: HashMap<String, String>,
        priority: JobPriority,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            task,
            params,
            priority,
            created_at: Utc::now(),
            timeout,
            state: Mutex::new(JobState {
                status: JobStatus::Queued,
                progress: 0,
                eta_ms: 0,
                result: None,
                error: None,
                started_at: None,
                completed_at: None,
                cancel: None,
            }),
        }
    }

    /// Rebuilds a job from its persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub fn restored(
        id: String,
        task: String,
        params: HashMap<String, String>,
        priority: JobPriority,
        timeout: Duration,
        status: JobStatus,
        progress: u8,
        result: Option<serde_json::Map<String, serde_json::Value>>,
        error: Option<String>,
        created_at: DateTime<Utc>,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            task,
            params,
            priority,
            created_at,
            timeout,
            state: Mutex::new(JobState {
                status,
                progress,
                eta_ms: 0,
                result,
                error,
                started_at,
                completed_at,
                cancel: None,
            }),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.lock().unwrap().status
    }

    pub fn progress(&self) -> u8 {
        self.state.lock().unwrap().progress
    }

    pub fn update_progress(&self, progress: u8) {
        self.state.lock().unwrap().progress = progress.min(100);
    }

    pub fn update_eta(&self, eta: Duration) {
        self.state.lock().unwrap().eta_ms = eta.as_millis() as i64;
    }

    /// Transitions `queued → running`, installing the cancellation handle.
    /// Returns false if the job is no longer queued (e.g. already canceled).
    pub fn mark_running(&self, cancel: CancellationToken) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.status != JobStatus::Queued {
            return false;
        }
        state.status = JobStatus::Running;
        state.started_at = Some(Utc::now());
        state.cancel = Some(cancel);
        true
    }

    /// Transitions `running → done` with the executor's result.
    pub fn set_result(&self, result: serde_json::Map<String, serde_json::Value>) {
        let mut state = self.state.lock().unwrap();
        if state.status != JobStatus::Running {
            return;
        }
        state.status = JobStatus::Done;
        state.result = Some(result);
        state.progress = 100;
        state.completed_at = Some(Utc::now());
        state.cancel = None;
    }

    /// Transitions `running → error` with the executor's failure.
    pub fn set_error(&self, error: &str) {
        let mut state = self.state.lock().unwrap();
        if state.status != JobStatus::Running {
            return;
        }
        state.status = JobStatus::Error;
        state.error = Some(error.to_string());
        state.completed_at = Some(Utc::now());
        state.cancel = None;
    }

    /// Transitions `running → timeout` when the deadline elapses first.
    pub fn mark_timeout(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status != JobStatus::Running {
            return;
        }
        state.status = JobStatus::Timeout;
        state.error = Some("timeout exceeded".to_string());
        state.completed_at = Some(Utc::now());
        state.cancel = None;
    }

    /// Attempts to cancel. Returns `false` for jobs already in a terminal
    /// state; otherwise fires the stored cancellation handle (when running)
    /// and transitions to `canceled`.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.status.is_terminal() {
            return false;
        }

        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }

        state.status = JobStatus::Canceled;
        state.completed_at = Some(Utc::now());
        true
    }

    /// Full job info as reported by `/jobs/status` and `/jobs/result`.
    pub fn info(&self) -> serde_json::Value {
        let state = self.state.lock().unwrap();

        let mut info = serde_json::Map::new();
        info.insert("job_id".into(), self.id.clone().into());
        info.insert("task".into(), self.task.clone().into());
        info.insert("status".into(), state.status.as_str().into());
        info.insert("progress".into(), state.progress.into());
        info.insert("eta_ms".into(), state.eta_ms.into());
        info.insert("created_at".into(), self.created_at.to_rfc3339().into());

        if let Some(started) = state.started_at {
            info.insert("started_at".into(), started.to_rfc3339().into());
        }
        if let Some(completed) = state.completed_at {
            info.insert("completed_at".into(), completed.to_rfc3339().into());
        }
        if let Some(error) = &state.error {
            info.insert("error".into(), error.clone().into());
        }
        if let Some(result) = &state.result {
            info.insert("result".into(), serde_json::Value::Object(result.clone()));
        }

        serde_json::Value::Object(info)
    }

    /// The persisted subset of this job's fields.
    pub fn snapshot(&self) -> JobRecord {
        let state = self.state.lock().unwrap();

        JobRecord {
            job_id: self.id.clone(),
            task: self.task.clone(),
            params: self.params.clone(),
            status: state.status,
            priority: self.priority,
            progress: state.progress,
            result: state.result.clone(),
            error: state.error.clone(),
            created_at: self.created_at,
            started_at: state.started_at,
            completed_at: state.completed_at,
        }
    }
}

/// The on-disk representation of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub task: String,
    pub params: HashMap<String, String>,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
