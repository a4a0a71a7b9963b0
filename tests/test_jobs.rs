use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anvil::jobs::manager::CancelError;
use anvil::jobs::{
    Job, JobClass, JobManager, JobManagerConfig, JobPriority, JobStatus, SubmitError, TaskExecutor,
};
use tokio_util::sync::CancellationToken;

fn test_config() -> JobManagerConfig {
    JobManagerConfig {
        max_queue_size: 100,
        cpu_concurrency: 4,
        io_concurrency: 10,
        cpu_timeout: Duration::from_secs(5),
        io_timeout: Duration::from_secs(5),
        persistence_file: None,
    }
}

async fn wait_for_terminal(job: &Arc<Job>) -> JobStatus {
    for _ in 0..300 {
        let status = job.status();
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {} never reached a terminal state", job.id);
}

/// Executor that records the order tasks started in, tagged by a `label`
/// param.
struct RecordingExecutor {
    order: Mutex<Vec<String>>,
}

impl TaskExecutor for RecordingExecutor {
    fn execute(
        &self,
        _ctx: &CancellationToken,
        _task: &str,
        params: &HashMap<String, String>,
    ) -> Result<serde_json::Map<String, serde_json::Value>, anvil::jobs::executor::ExecuteError>
    {
        let label = params.get("label").cloned().unwrap_or_default();
        self.order.lock().unwrap().push(label);
        Ok(serde_json::Map::new())
    }
}

/// Executor that sleeps well past any deadline and never checks the
/// cancellation handle.
struct StubbornExecutor;

impl TaskExecutor for StubbornExecutor {
    fn execute(
        &self,
        _ctx: &CancellationToken,
        _task: &str,
        _params: &HashMap<String, String>,
    ) -> Result<serde_json::Map<String, serde_json::Value>, anvil::jobs::executor::ExecuteError>
    {
        std::thread::sleep(Duration::from_millis(500));
        Ok(serde_json::Map::new())
    }
}

#[test]
fn test_class_inference() {
    for task in ["isprime", "factor", "pi", "mandelbrot", "matrixmul", "fibonacci"] {
        assert_eq!(JobClass::classify(task), JobClass::Cpu, "{task}");
    }
    assert_eq!(JobClass::classify("sortfile"), JobClass::Io);
    assert_eq!(JobClass::classify("anything-else"), JobClass::Io);
}

#[test]
fn test_job_ids_embed_the_task_name() {
    let manager = JobManager::new(test_config());
    let job = manager.submit("isprime", HashMap::new(), JobPriority::Normal).unwrap();

    assert!(job.id.starts_with("isprime-"));
    assert_eq!(job.status(), JobStatus::Queued);
}

#[test]
fn test_submit_rejects_when_class_queue_is_full() {
    let mut config = test_config();
    config.max_queue_size = 2;
    let manager = JobManager::new(config);

    manager.submit("grep", HashMap::new(), JobPriority::Normal).unwrap();
    manager.submit("grep", HashMap::new(), JobPriority::Normal).unwrap();

    let err = manager
        .submit("grep", HashMap::new(), JobPriority::Normal)
        .unwrap_err();
    assert!(matches!(err, SubmitError::QueueFull));
    assert_eq!(err.to_string(), "queue full");

    // Classes have independent queues: the CPU queue still has room.
    manager.submit("isprime", HashMap::new(), JobPriority::Normal).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_high_priority_job_runs_first_under_a_cap_of_one() {
    let mut config = test_config();
    config.cpu_concurrency = 1;
    let manager = Arc::new(JobManager::new(config));

    let executor = Arc::new(RecordingExecutor {
        order: Mutex::new(Vec::new()),
    });
    manager.set_executor(executor.clone());

    let mut normal = HashMap::new();
    normal.insert("label".to_string(), "B".to_string());
    let job_b = manager.submit("isprime", normal, JobPriority::Normal).unwrap();

    let mut high = HashMap::new();
    high.insert("label".to_string(), "A".to_string());
    let job_a = manager.submit("isprime", high, JobPriority::High).unwrap();

    manager.start();

    assert_eq!(wait_for_terminal(&job_a).await, JobStatus::Done);
    assert_eq!(wait_for_terminal(&job_b).await, JobStatus::Done);

    let order = executor.order.lock().unwrap();
    assert_eq!(*order, vec!["A".to_string(), "B".to_string()]);

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deadline_beats_an_executor_that_ignores_cancellation() {
    let mut config = test_config();
    config.cpu_timeout = Duration::from_millis(50);
    let manager = Arc::new(JobManager::new(config));
    manager.set_executor(Arc::new(StubbornExecutor));
    manager.start();

    let job = manager.submit("isprime", HashMap::new(), JobPriority::Normal).unwrap();

    assert_eq!(wait_for_terminal(&job).await, JobStatus::Timeout);

    let info = job.info();
    assert_eq!(info["error"], "timeout exceeded");
    assert!(info.get("completed_at").is_some());

    manager.shutdown().await;
}

#[test]
fn test_cancel_a_queued_job() {
    let manager = JobManager::new(test_config());
    let job = manager.submit("grep", HashMap::new(), JobPriority::Normal).unwrap();

    assert_eq!(manager.cancel_job(&job.id).unwrap(), true);
    assert_eq!(job.status(), JobStatus::Canceled);

    // Second cancel is a no-op reported as not-cancelable.
    assert_eq!(manager.cancel_job(&job.id).unwrap(), false);
}

#[test]
fn test_cancel_unknown_job_is_not_found() {
    let manager = JobManager::new(test_config());
    assert!(matches!(
        manager.cancel_job("isprime-12345"),
        Err(CancelError::NotFound)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_canceled_queued_job_is_never_dispatched() {
    let manager = Arc::new(JobManager::new(test_config()));
    let executor = Arc::new(RecordingExecutor {
        order: Mutex::new(Vec::new()),
    });
    manager.set_executor(executor.clone());

    let job = manager.submit("grep", HashMap::new(), JobPriority::Normal).unwrap();
    manager.cancel_job(&job.id).unwrap();

    manager.start();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(job.status(), JobStatus::Canceled);
    assert!(executor.order.lock().unwrap().is_empty());

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_done_job_reports_not_cancelable() {
    let manager = Arc::new(JobManager::new(test_config()));
    manager.set_executor(Arc::new(RecordingExecutor {
        order: Mutex::new(Vec::new()),
    }));
    manager.start();

    let job = manager.submit("isprime", HashMap::new(), JobPriority::Normal).unwrap();
    assert_eq!(wait_for_terminal(&job).await, JobStatus::Done);

    assert_eq!(manager.cancel_job(&job.id).unwrap(), false);
    assert_eq!(job.status(), JobStatus::Done);

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fallback_executor_simulates_progress() {
    let manager = Arc::new(JobManager::new(test_config()));
    manager.start();

    let job = manager.submit("whatever", HashMap::new(), JobPriority::Normal).unwrap();

    assert_eq!(wait_for_terminal(&job).await, JobStatus::Done);
    assert_eq!(job.progress(), 100);

    let info = job.info();
    assert_eq!(info["result"]["completed"], true);

    manager.shutdown().await;
}

#[test]
fn test_terminal_state_cannot_be_overwritten() {
    let job = Job::new(
        "grep-1".into(),
        "grep".into(),
        HashMap::new(),
        JobPriority::Normal,
        Duration::from_secs(1),
    );

    assert!(job.cancel());
    assert_eq!(job.status(), JobStatus::Canceled);

    // A straggling executor result must not resurrect the job.
    job.set_result(serde_json::Map::new());
    job.set_error("late failure");
    assert_eq!(job.status(), JobStatus::Canceled);
}

#[test]
fn test_status_sequence_is_queued_running_terminal() {
    let job = Job::new(
        "grep-2".into(),
        "grep".into(),
        HashMap::new(),
        JobPriority::Normal,
        Duration::from_secs(1),
    );

    assert_eq!(job.status(), JobStatus::Queued);
    assert!(job.mark_running(CancellationToken::new()));
    assert_eq!(job.status(), JobStatus::Running);

    job.set_result(serde_json::Map::new());
    assert_eq!(job.status(), JobStatus::Done);
    assert_eq!(job.progress(), 100);

    // Running is only reachable from queued.
    assert!(!job.mark_running(CancellationToken::new()));
}

#[test]
fn test_persistence_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");

    let mut config = test_config();
    config.persistence_file = Some(path.clone());

    {
        let manager = JobManager::new(config.clone());
        let mut params = HashMap::new();
        params.insert("num".to_string(), "97".to_string());
        manager.submit("isprime", params, JobPriority::High).unwrap();
        manager.submit("grep", HashMap::new(), JobPriority::Low).unwrap();
    }

    let restored = JobManager::new(config);
    let stats = restored.queue_stats();
    assert_eq!(stats["total_jobs"], 2);
    assert_eq!(stats["cpu"]["queued"], 1);
    assert_eq!(stats["io"]["queued"], 1);
}

#[test]
fn test_persisted_running_jobs_become_error_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");

    let snapshot = serde_json::json!([
        {
            "job_id": "pi-100",
            "task": "pi",
            "params": {"digits": "50"},
            "status": "running",
            "priority": "normal",
            "progress": 40,
            "created_at": "2026-07-01T10:00:00Z",
            "started_at": "2026-07-01T10:00:01Z",
        },
        {
            "job_id": "grep-200",
            "task": "grep",
            "params": {},
            "status": "done",
            "priority": "high",
            "progress": 100,
            "created_at": "2026-07-01T09:00:00Z",
            "completed_at": "2026-07-01T09:00:02Z",
        }
    ]);
    std::fs::write(&path, serde_json::to_vec_pretty(&snapshot).unwrap()).unwrap();

    let mut config = test_config();
    config.persistence_file = Some(path);
    let manager = JobManager::new(config);

    let interrupted = manager.get_job("pi-100").unwrap();
    assert_eq!(interrupted.status(), JobStatus::Error);
    assert_eq!(interrupted.info()["error"], "server restarted");

    let finished = manager.get_job("grep-200").unwrap();
    assert_eq!(finished.status(), JobStatus::Done);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_queued_jobs_survive_restart_and_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");

    let mut config = test_config();
    config.persistence_file = Some(path);

    let job_id = {
        let manager = JobManager::new(config.clone());
        let job = manager.submit("grep", HashMap::new(), JobPriority::Normal).unwrap();
        job.id.clone()
    };

    let manager = Arc::new(JobManager::new(config));
    manager.set_executor(Arc::new(RecordingExecutor {
        order: Mutex::new(Vec::new()),
    }));
    manager.start();

    let job = manager.get_job(&job_id).unwrap();
    assert_eq!(wait_for_terminal(&job).await, JobStatus::Done);

    manager.shutdown().await;
}

#[test]
fn test_priority_parsing_defaults_to_normal() {
    assert_eq!(JobPriority::from_query(Some("low")), JobPriority::Low);
    assert_eq!(JobPriority::from_query(Some("high")), JobPriority::High);
    assert_eq!(JobPriority::from_query(Some("normal")), JobPriority::Normal);
    assert_eq!(JobPriority::from_query(Some("urgent")), JobPriority::Normal);
    assert_eq!(JobPriority::from_query(None), JobPriority::Normal);
}
