//! Per-endpoint latency metrics.
//!
//! Each endpoint (keyed `"METHOD PATH"`) keeps two rolling windows of the
//! last 1000 samples: time spent waiting in the task queue and handler
//! execution time, both in milliseconds. Statistics are computed on demand
//! from a snapshot copy, so readers never block writers for long.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

/// Samples retained per window.
const WINDOW_SIZE: usize = 1000;

/// Rolling latency samples and counters for one endpoint.
pub struct EndpointMetrics {
    endpoint: String,
    inner: Mutex<Window>,
}

struct Window {
    wait_ms: Vec<f64>,
    exec_ms: Vec<f64>,
    total_requests: i64,
    active_requests: i64,
    last_update: DateTime<Utc>,
}

impl EndpointMetrics {
    fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            inner: Mutex::new(Window {
                wait_ms: Vec::with_capacity(WINDOW_SIZE),
                exec_ms: Vec::with_capacity(WINDOW_SIZE),
                total_requests: 0,
                active_requests: 0,
                last_update: Utc::now(),
            }),
        }
    }

    /// Records time spent queued before a worker picked the request up.
    pub fn record_wait_time(&self, wait: Duration) {
        let mut inner = self.inner.lock().unwrap();
        push_sample(&mut inner.wait_ms, wait.as_secs_f64() * 1000.0);
    }

    /// Records handler execution time and counts the request as completed.
    pub fn record_exec_time(&self, exec: Duration) {
        let mut inner = self.inner.lock().unwrap();
        push_sample(&mut inner.exec_ms, exec.as_secs_f64() * 1000.0);
        inner.total_requests += 1;
        inner.last_update = Utc::now();
    }

    pub fn increment_active(&self) {
        self.inner.lock().unwrap().active_requests += 1;
    }

    pub fn decrement_active(&self) {
        self.inner.lock().unwrap().active_requests -= 1;
    }

    /// Computes the reported statistics from a snapshot of both windows.
    pub fn stats(&self) -> serde_json::Value {
        let (wait, exec, total, active, last_update) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.wait_ms.clone(),
                inner.exec_ms.clone(),
                inner.total_requests,
                inner.active_requests,
                inner.last_update,
            )
        };

        json!({
            "endpoint": self.endpoint,
            "total_requests": total,
            "active_requests": active,
            "wait_time": window_stats(&wait),
            "exec_time": window_stats(&exec),
            "last_update": last_update.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

fn push_sample(window: &mut Vec<f64>, sample: f64) {
    window.push(sample);
    if window.len() > WINDOW_SIZE {
        let excess = window.len() - WINDOW_SIZE;
        window.drain(..excess);
    }
}

fn window_stats(values: &[f64]) -> serde_json::Value {
    json!({
        "avg_ms": mean(values),
        "std_dev": std_dev(values),
        "min_ms": min(values),
        "max_ms": max(values),
        "p50_ms": percentile(values, 0.50),
        "p95_ms": percentile(values, 0.95),
        "p99_ms": percentile(values, 0.99),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().sum::<f64>() / values.len() as f64)
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - avg) * (v - avg)).sum::<f64>() / values.len() as f64;
    round2(variance.sqrt())
}

fn min(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().copied().fold(f64::INFINITY, f64::min))
}

fn max(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().copied().fold(f64::MIN, f64::max))
}

/// Percentile by `floor(p * N)` indexing into a sorted snapshot, clamped to
/// the last element.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut index = (sorted.len() as f64 * p).floor() as usize;
    if index >= sorted.len() {
        index = sorted.len() - 1;
    }
    round2(sorted[index])
}

/// Registry of per-endpoint metrics.
pub struct MetricsRegistry {
    metrics: RwLock<HashMap<String, Arc<EndpointMetrics>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the metrics for `endpoint`, creating them on first use.
    pub fn get_or_create(&self, endpoint: &str) -> Arc<EndpointMetrics> {
        {
            let metrics = self.metrics.read().unwrap();
            if let Some(m) = metrics.get(endpoint) {
                return Arc::clone(m);
            }
        }

        let mut metrics = self.metrics.write().unwrap();
        Arc::clone(
            metrics
                .entry(endpoint.to_string())
                .or_insert_with(|| Arc::new(EndpointMetrics::new(endpoint))),
        )
    }

    /// Statistics for every tracked endpoint.
    pub fn all_stats(&self) -> serde_json::Value {
        let metrics = self.metrics.read().unwrap();

        let mut all = serde_json::Map::new();
        for (endpoint, m) in metrics.iter() {
            all.insert(endpoint.clone(), m.stats());
        }
        serde_json::Value::Object(all)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
