//! Bounded blocking request queue.
//!
//! A multi-producer, single-consumer FIFO channel. `put` blocks while the
//! queue is full, `get` blocks while it is empty. The scheduler enqueues
//! `Option<DiskRequest>` values and uses `None` as the shutdown sentinel.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// A bounded FIFO channel with blocking put/get.
pub struct RequestQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> RequestQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 1, "queue capacity must be at least 1");
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Enqueues `item`, blocking while the queue is full.
    pub fn put(&self, item: T) {
        let mut items = self.items.lock();
        while items.len() >= self.capacity {
            self.not_full.wait(&mut items);
        }
        items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Dequeues the oldest item, blocking while the queue is empty.
    pub fn get(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                self.not_full.notify_one();
                return item;
            }
            self.not_empty.wait(&mut items);
        }
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = RequestQueue::with_capacity(8);
        for i in 0..5 {
            queue.put(i);
        }
        for i in 0..5 {
            assert_eq!(queue.get(), i);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_get_blocks_until_put() {
        let queue = Arc::new(RequestQueue::with_capacity(4));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.get())
        };

        thread::sleep(Duration::from_millis(20));
        queue.put(42u32);
        assert_eq!(consumer.join().unwrap(), 42);
    }

    #[test]
    fn test_put_blocks_when_full() {
        let queue = Arc::new(RequestQueue::with_capacity(2));
        queue.put(1);
        queue.put(2);

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.put(3);
            })
        };

        // The producer cannot finish until a slot frees up.
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.get(), 1);
        producer.join().unwrap();
        assert_eq!(queue.get(), 2);
        assert_eq!(queue.get(), 3);
    }

    #[test]
    fn test_sentinel_round_trips() {
        let queue: RequestQueue<Option<u32>> = RequestQueue::with_capacity(2);
        queue.put(Some(1));
        queue.put(None);
        assert_eq!(queue.get(), Some(1));
        assert_eq!(queue.get(), None);
    }

    #[test]
    fn test_multiple_producers() {
        let queue = Arc::new(RequestQueue::with_capacity(4));
        let mut handles = Vec::new();
        for i in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for j in 0..25 {
                    queue.put(i * 100 + j);
                }
            }));
        }

        let mut seen = Vec::new();
        for _ in 0..100 {
            seen.push(queue.get());
        }
        for handle in handles {
            handle.join().unwrap();
        }

        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 100);
    }
}
