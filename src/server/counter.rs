use std::sync::atomic::{AtomicI64, Ordering};

/// Thread-safe monotonic counter backed by an atomic integer.
///
/// Used for connection ids, active-connection tracking and busy-worker
/// accounting. All operations are lock-free.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
        }
    }

    /// Increments the counter and returns the new value.
    pub fn increment(&self) -> i64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrements the counter and returns the new value.
    pub fn decrement(&self) -> i64 {
        self.value.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Adds a delta and returns the new value.
    pub fn add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::SeqCst) + delta
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Resets to zero. Behavior under concurrent increments is an operator
    /// concern, not a contract.
    pub fn reset(&self) {
        self.value.store(0, Ordering::SeqCst);
    }
}
