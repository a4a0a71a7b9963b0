use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::http::request::RequestBuilder;
use crate::router::Handler;

/// Errors surfaced by task execution. They end up verbatim in the job's
/// `error` field.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("unknown task: {0}")]
    UnknownTask(String),
    #[error("task failed: {body} (status {status})")]
    TaskFailed { status: u16, body: String },
    #[error("task canceled")]
    Canceled,
}

/// Executes a named task on behalf of the job manager.
///
/// Implementations run on a blocking thread, so they may do synchronous
/// work, but anything non-trivial must periodically check `ctx` and bail
/// out once it is cancelled; the deadline and client cancellation both
/// arrive through it.
pub trait TaskExecutor: Send + Sync {
    fn execute(
        &self,
        ctx: &CancellationToken,
        task: &str,
        params: &HashMap<String, String>,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ExecuteError>;
}

/// Bridges the job manager to the request-handler table.
///
/// Each task name maps to one registered handler. Execution builds a
/// synthetic `GET /<task>` request carrying the job params, invokes the
/// handler, and converts the response: 200 becomes a
/// `{status_code, body}` result map, anything else an error.
pub struct HandlerExecutor {
    tasks: HashMap<String, Handler>,
}

impl HandlerExecutor {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Registers `handler` as the implementation of `task`.
    pub fn register(&mut self, task: &str, handler: Handler) {
        self.tasks.insert(task.to_string(), handler);
    }

    pub fn into_shared(self) -> Arc<dyn TaskExecutor> {
        Arc::new(self)
    }
}

impl Default for HandlerExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskExecutor for HandlerExecutor {
    fn execute(
        &self,
        ctx: &CancellationToken,
        task: &str,
        params: &HashMap<String, String>,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ExecuteError> {
        let handler = self
            .tasks
            .get(task)
            .ok_or_else(|| ExecuteError::UnknownTask(task.to_string()))?;

        let request = RequestBuilder::new()
            .method("GET")
            .path(format!("/{task}"))
            .params(params.clone())
            .build();

        let response = handler(&request);

        // The handler may have finished after the deadline or a client
        // cancel; the cancellation wins.
        if ctx.is_cancelled() {
            return Err(ExecuteError::Canceled);
        }

        if response.status.as_u16() != 200 {
            return Err(ExecuteError::TaskFailed {
                status: response.status.as_u16(),
                body: response.body,
            });
        }

        let mut result = serde_json::Map::new();
        result.insert("status_code".into(), response.status.as_u16().into());
        result.insert("body".into(), response.body.into());
        Ok(result)
    }
}
