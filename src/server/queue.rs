use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

/// Bounded FIFO queue with a "not-empty" event source.
///
/// The queue itself never blocks: `enqueue` fails fast when full or closed
/// and `dequeue` returns `None` when empty. Consumers that want to wait do so
/// through [`BoundedQueue::notified`], which resolves after an enqueue.
/// Wakeups are coalesced (several enqueues may produce a single wakeup), so
/// consumers must re-check the queue after waking.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Notify,
    capacity: usize,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

const DEFAULT_CAPACITY: usize = 100;

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items. Non-positive
    /// capacities fall back to a small default.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };

        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Notify::new(),
            capacity,
        }
    }

    /// Appends an item. Returns `false` when the queue is full or closed;
    /// a rejected item is dropped.
    pub fn enqueue(&self, item: T) -> bool {
        {
            let mut inner = self.inner.lock().unwrap();

            if inner.closed || inner.items.len() >= self.capacity {
                return false;
            }

            inner.items.push_back(item);
        }

        // Stores at most one permit, so back-to-back enqueues coalesce.
        self.not_empty.notify_one();
        true
    }

    /// Removes and returns the oldest item, or `None` when empty. Never
    /// waits; pending items remain drainable after `close`.
    pub fn dequeue(&self) -> Option<T> {
        self.inner.lock().unwrap().items.pop_front()
    }

    /// Resolves once an item has been enqueued since this call. Spurious
    /// wakeups are possible; callers must loop.
    pub async fn notified(&self) {
        self.not_empty.notified().await;
    }

    /// Closes the queue: subsequent enqueues fail and all current waiters
    /// are woken. Idempotent.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.closed = true;
        }
        self.not_empty.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }
}
