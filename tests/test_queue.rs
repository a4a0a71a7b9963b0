use std::sync::Arc;
use std::time::Duration;

use anvil::server::{BoundedQueue, Counter};

#[test]
fn test_fifo_order() {
    let queue = BoundedQueue::new(10);

    for i in 0..5 {
        assert!(queue.enqueue(i));
    }
    for expected in 0..5 {
        assert_eq!(queue.dequeue(), Some(expected));
    }
    assert_eq!(queue.dequeue(), None);
}

#[test]
fn test_capacity_is_enforced() {
    let queue = BoundedQueue::new(3);

    assert!(queue.enqueue(1));
    assert!(queue.enqueue(2));
    assert!(queue.enqueue(3));
    assert!(queue.is_full());
    assert!(!queue.enqueue(4));
    assert_eq!(queue.size(), 3);
}

#[test]
fn test_size_never_exceeds_capacity() {
    let queue = BoundedQueue::new(4);

    // Interleaved enqueue/dequeue: the size invariant holds throughout.
    for round in 0..50 {
        queue.enqueue(round);
        assert!(queue.size() <= 4);
        if round % 3 == 0 {
            queue.dequeue();
        }
        assert!(queue.size() <= 4);
    }
}

#[test]
fn test_dequeue_on_empty_returns_none() {
    let queue: BoundedQueue<u32> = BoundedQueue::new(2);
    assert!(queue.is_empty());
    assert_eq!(queue.dequeue(), None);
}

#[test]
fn test_close_rejects_enqueue_but_keeps_items_drainable() {
    let queue = BoundedQueue::new(5);
    queue.enqueue("a");
    queue.enqueue("b");

    queue.close();
    assert!(queue.is_closed());
    assert!(!queue.enqueue("c"));

    assert_eq!(queue.dequeue(), Some("a"));
    assert_eq!(queue.dequeue(), Some("b"));
    assert_eq!(queue.dequeue(), None);
}

#[test]
fn test_close_is_idempotent() {
    let queue: BoundedQueue<u32> = BoundedQueue::new(2);
    queue.close();
    queue.close();
    assert!(queue.is_closed());
}

#[tokio::test]
async fn test_notified_wakes_a_waiting_consumer() {
    let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4));

    let waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            loop {
                if let Some(item) = queue.dequeue() {
                    return item;
                }
                queue.notified().await;
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(queue.enqueue(42));

    let got = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("consumer should wake")
        .unwrap();
    assert_eq!(got, 42);
}

#[tokio::test]
async fn test_close_wakes_waiters() {
    let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4));

    let waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            queue.notified().await;
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.close();

    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("close should wake waiters")
        .unwrap();
}

#[test]
fn test_counter_basics() {
    let counter = Counter::new();

    assert_eq!(counter.get(), 0);
    assert_eq!(counter.increment(), 1);
    assert_eq!(counter.increment(), 2);
    assert_eq!(counter.decrement(), 1);
    assert_eq!(counter.add(10), 11);

    counter.set(5);
    assert_eq!(counter.get(), 5);

    counter.reset();
    assert_eq!(counter.get(), 0);
}

#[test]
fn test_counter_is_thread_safe() {
    let counter = Arc::new(Counter::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let counter = Arc::clone(&counter);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    counter.increment();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(counter.get(), 8 * 1000);
}
