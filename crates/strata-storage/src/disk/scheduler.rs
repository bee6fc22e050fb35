//! Disk request scheduler.
//!
//! The scheduler owns a bounded request queue and exactly one worker
//! thread. Requests execute strictly in enqueue order; there is no
//! batching, merging, or reordering. Each request carries a one-shot
//! [`Promise`] that the worker fulfills once the disk call returns, so the
//! issuer can block on the matching [`Completion`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex, RwLock};
use strata_common::constants::DISK_QUEUE_DEPTH;
use strata_common::types::PageId;

use super::manager::DiskManager;
use super::queue::RequestQueue;

/// Shared handle to a page-sized I/O buffer.
///
/// A request clones the issuing frame's buffer handle, which keeps the
/// buffer alive until the completion fires.
pub type PageBuffer = Arc<RwLock<Box<[u8]>>>;

struct Signal {
    value: Mutex<Option<bool>>,
    done: Condvar,
}

/// Write half of a one-shot completion signal.
pub struct Promise {
    signal: Arc<Signal>,
}

impl Promise {
    /// Fulfills the signal. `true` means the disk call succeeded.
    pub fn set(self, result: bool) {
        *self.signal.value.lock() = Some(result);
        self.signal.done.notify_all();
    }
}

/// Read half of a one-shot completion signal.
pub struct Completion {
    signal: Arc<Signal>,
}

impl Completion {
    /// Blocks until the matching [`Promise`] is fulfilled and returns its
    /// payload.
    pub fn wait(self) -> bool {
        let mut value = self.signal.value.lock();
        loop {
            if let Some(result) = *value {
                return result;
            }
            self.signal.done.wait(&mut value);
        }
    }
}

/// A single page transfer to execute on the worker thread.
pub struct DiskRequest {
    /// Write the buffer out if true, read into it otherwise.
    pub is_write: bool,
    /// The page buffer to transfer. Must stay untouched by other writers
    /// until the completion fires; the pool guarantees this by holding its
    /// latch across the wait.
    pub data: PageBuffer,
    /// The page to read or write.
    pub page_id: PageId,
    /// Fulfilled by the worker after the disk call returns.
    pub done: Promise,
}

/// Serializes page I/O on a dedicated worker thread.
pub struct DiskScheduler {
    queue: Arc<RequestQueue<Option<DiskRequest>>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawns the worker thread for `disk`.
    pub fn new(disk: Arc<dyn DiskManager>) -> Self {
        let queue = Arc::new(RequestQueue::with_capacity(DISK_QUEUE_DEPTH));
        let worker = {
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name("strata-disk".into())
                .spawn(move || worker_loop(disk, queue))
                .expect("failed to spawn disk scheduler worker")
        };
        Self {
            queue,
            worker: Some(worker),
        }
    }

    /// Creates a fresh one-shot signal pair for a request.
    pub fn create_promise(&self) -> (Promise, Completion) {
        let signal = Arc::new(Signal {
            value: Mutex::new(None),
            done: Condvar::new(),
        });
        (
            Promise {
                signal: Arc::clone(&signal),
            },
            Completion { signal },
        )
    }

    /// Enqueues a request for the worker. Blocks while the queue is full.
    pub fn schedule(&self, request: DiskRequest) {
        self.queue.put(Some(request));
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.queue.put(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(disk: Arc<dyn DiskManager>, queue: Arc<RequestQueue<Option<DiskRequest>>>) {
    tracing::debug!("disk scheduler worker started");
    while let Some(request) = queue.get() {
        let ok = if request.is_write {
            let data = request.data.read();
            match disk.write_page(request.page_id, &data) {
                Ok(()) => true,
                Err(error) => {
                    tracing::error!(page_id = %request.page_id, %error, "page write failed");
                    false
                }
            }
        } else {
            let mut data = request.data.write();
            match disk.read_page(request.page_id, &mut data) {
                Ok(()) => true,
                Err(error) => {
                    tracing::error!(page_id = %request.page_id, %error, "page read failed");
                    false
                }
            }
        };
        request.done.set(ok);
    }
    tracing::debug!("disk scheduler worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::manager::MemoryDiskManager;
    use strata_common::constants::PAGE_SIZE;

    fn buffer_with(byte: u8) -> PageBuffer {
        Arc::new(RwLock::new(vec![byte; PAGE_SIZE].into_boxed_slice()))
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let disk = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::new(Arc::clone(&disk) as Arc<dyn DiskManager>);

        let out = buffer_with(0x5a);
        let (promise, completion) = scheduler.create_promise();
        scheduler.schedule(DiskRequest {
            is_write: true,
            data: Arc::clone(&out),
            page_id: PageId::new(0),
            done: promise,
        });
        assert!(completion.wait());

        let back = buffer_with(0);
        let (promise, completion) = scheduler.create_promise();
        scheduler.schedule(DiskRequest {
            is_write: false,
            data: Arc::clone(&back),
            page_id: PageId::new(0),
            done: promise,
        });
        assert!(completion.wait());

        assert_eq!(&**back.read(), &**out.read());
    }

    #[test]
    fn test_requests_execute_in_enqueue_order() {
        let disk = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::new(Arc::clone(&disk) as Arc<dyn DiskManager>);

        // Issue a burst of writes to the same page; the last one enqueued
        // must be the one the disk retains.
        let mut last = None;
        for byte in 1..=8u8 {
            let (promise, completion) = scheduler.create_promise();
            scheduler.schedule(DiskRequest {
                is_write: true,
                data: buffer_with(byte),
                page_id: PageId::new(1),
                done: promise,
            });
            last = Some(completion);
        }
        assert!(last.unwrap().wait());

        let stored = disk.page(PageId::new(1)).unwrap();
        assert!(stored.iter().all(|&b| b == 8));
    }

    #[test]
    fn test_failed_request_resolves_false() {
        let disk = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::new(Arc::clone(&disk) as Arc<dyn DiskManager>);

        disk.fail_writes(true);
        let (promise, completion) = scheduler.create_promise();
        scheduler.schedule(DiskRequest {
            is_write: true,
            data: buffer_with(1),
            page_id: PageId::new(4),
            done: promise,
        });
        assert!(!completion.wait());

        // The worker survives the failure and keeps serving requests.
        disk.fail_writes(false);
        let (promise, completion) = scheduler.create_promise();
        scheduler.schedule(DiskRequest {
            is_write: true,
            data: buffer_with(2),
            page_id: PageId::new(4),
            done: promise,
        });
        assert!(completion.wait());
    }

    #[test]
    fn test_drop_joins_worker() {
        let disk = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::new(disk as Arc<dyn DiskManager>);
        drop(scheduler);
    }

    #[test]
    fn test_completion_from_another_thread() {
        let disk = Arc::new(MemoryDiskManager::new());
        let scheduler = Arc::new(DiskScheduler::new(disk as Arc<dyn DiskManager>));

        let (promise, completion) = scheduler.create_promise();
        let waiter = std::thread::spawn(move || completion.wait());

        scheduler.schedule(DiskRequest {
            is_write: true,
            data: buffer_with(1),
            page_id: PageId::new(2),
            done: promise,
        });
        assert!(waiter.join().unwrap());
    }
}
