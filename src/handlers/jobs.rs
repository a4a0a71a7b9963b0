use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::jobs::{JobManager, JobPriority, JobStatus, SubmitError};
use crate::router::Handler;

/// `POST /jobs/submit?task=NAME[&prio=low|normal|high][&...]`: queues a
/// job. Every query parameter other than `task` and `prio` is passed to the
/// task as-is.
pub fn submit_handler(manager: Arc<JobManager>) -> Handler {
    Arc::new(move |req: &Request| {
        let task = match req.param("task") {
            Some(t) if !t.is_empty() => t,
            _ => return Response::error(StatusCode::BadRequest, "missing task parameter"),
        };

        let priority = JobPriority::from_query(req.param("prio"));

        let params: HashMap<String, String> = req
            .params
            .iter()
            .filter(|(k, _)| k.as_str() != "task" && k.as_str() != "prio")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match manager.submit(task, params, priority) {
            Ok(job) => Response::json(&json!({
                "job_id": job.id,
                "status": job.status().as_str(),
            })),
            Err(SubmitError::QueueFull) => {
                let body = serde_json::to_string_pretty(&json!({
                    "error": "queue full",
                    "retry_after_ms": 5000,
                }))
                .unwrap_or_default();

                ResponseBuilder::new(StatusCode::ServiceUnavailable)
                    .header("Content-Type", "application/json")
                    .header("Retry-After", "5")
                    .body(body)
                    .build()
            }
        }
    })
}

/// `GET /jobs/status?id=JOB`: status, progress and ETA.
pub fn status_handler(manager: Arc<JobManager>) -> Handler {
    Arc::new(move |req: &Request| {
        let job_id = match req.param("id") {
            Some(id) if !id.is_empty() => id,
            _ => return Response::error(StatusCode::BadRequest, "missing id parameter"),
        };

        let Some(job) = manager.get_job(job_id) else {
            return Response::error(StatusCode::NotFound, "job not found");
        };

        let info = job.info();
        let mut body = json!({
            "job_id": info["job_id"],
            "status": info["status"],
            "progress": info["progress"],
            "eta_ms": info["eta_ms"],
        });
        if let Some(error) = info.get("error") {
            body["error"] = error.clone();
        }

        Response::json(&body)
    })
}

/// `GET /jobs/result?id=JOB`: the full job record once `done`; otherwise
/// just id, status and any error.
pub fn result_handler(manager: Arc<JobManager>) -> Handler {
    Arc::new(move |req: &Request| {
        let job_id = match req.param("id") {
            Some(id) if !id.is_empty() => id,
            _ => return Response::error(StatusCode::BadRequest, "missing id parameter"),
        };

        let Some(job) = manager.get_job(job_id) else {
            return Response::error(StatusCode::NotFound, "job not found");
        };

        let info = job.info();
        if job.status() != JobStatus::Done {
            let mut body = json!({
                "job_id": info["job_id"],
                "status": info["status"],
            });
            if let Some(error) = info.get("error") {
                body["error"] = error.clone();
            }
            return Response::json(&body);
        }

        Response::json(&info)
    })
}

/// `POST /jobs/cancel?id=JOB`: cancels a queued or running job; terminal
/// jobs report `not_cancelable`.
pub fn cancel_handler(manager: Arc<JobManager>) -> Handler {
    Arc::new(move |req: &Request| {
        let job_id = match req.param("id") {
            Some(id) if !id.is_empty() => id,
            _ => return Response::error(StatusCode::BadRequest, "missing id parameter"),
        };

        match manager.cancel_job(job_id) {
            Ok(canceled) => Response::json(&json!({
                "job_id": job_id,
                "status": if canceled { "canceled" } else { "not_cancelable" },
            })),
            Err(_) => Response::error(StatusCode::NotFound, "job not found"),
        }
    })
}
