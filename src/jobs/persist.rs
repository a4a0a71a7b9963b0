use std::path::Path;

use crate::jobs::job::JobRecord;

/// Writes the full job set to `path`, atomically replacing any previous
/// snapshot. Failures are logged at debug level and otherwise ignored:
/// persistence is best-effort and must never take the manager down.
pub fn save_jobs(path: &Path, records: &[JobRecord]) {
    let data = match serde_json::to_vec_pretty(records) {
        Ok(data) => data,
        Err(err) => {
            tracing::debug!(error = %err, "Failed to serialize job snapshot");
            return;
        }
    };

    let tmp = path.with_extension("tmp");
    if let Err(err) = std::fs::write(&tmp, &data) {
        tracing::debug!(error = %err, "Failed to write job snapshot");
        return;
    }

    if let Err(err) = std::fs::rename(&tmp, path) {
        tracing::debug!(error = %err, "Failed to replace job snapshot");
    }
}

/// Loads a previously saved job set. A missing or unreadable file yields an
/// empty list; restart rewriting (`running → error`) is the manager's job.
pub fn load_jobs(path: &Path) -> Vec<JobRecord> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(_) => return Vec::new(),
    };

    match serde_json::from_slice(&data) {
        Ok(records) => records,
        Err(err) => {
            tracing::debug!(error = %err, "Failed to parse job snapshot");
            Vec::new()
        }
    }
}
