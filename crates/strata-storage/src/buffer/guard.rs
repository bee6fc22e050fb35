//! Scoped page guards.
//!
//! A guard wraps a pinned frame so that going out of scope always releases
//! the pin; the latched variants additionally hold the frame's reader or
//! writer latch for their whole lifetime. Release order is strict:
//! unlatch, then unpin. Guards are move-only and releasing twice is a
//! no-op.

use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLockReadGuard, RwLockWriteGuard};
use strata_common::types::PageId;

use super::frame::BufferFrame;
use super::pool::BufferPool;

type ReadLatch = ArcRwLockReadGuard<RawRwLock, Box<[u8]>>;
type WriteLatch = ArcRwLockWriteGuard<RawRwLock, Box<[u8]>>;

/// A pinned page. Dropping the guard unpins it, carrying whatever dirty
/// flag accumulated through [`data_mut`](Self::data_mut) or
/// [`mark_dirty`](Self::mark_dirty).
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    frame: Option<Arc<BufferFrame>>,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(pool: &'a BufferPool, frame: Arc<BufferFrame>) -> Self {
        Self {
            pool,
            frame: Some(frame),
            dirty: false,
        }
    }

    /// Page id of the guarded frame, or `PageId::INVALID` after release.
    pub fn page_id(&self) -> PageId {
        self.frame
            .as_ref()
            .map_or(PageId::INVALID, |frame| frame.page_id())
    }

    /// Latches the page for reading for the duration of the returned
    /// borrow.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.frame().read_data()
    }

    /// Latches the page for writing for the duration of the returned
    /// borrow and marks the guard dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.dirty = true;
        self.frame().write_data()
    }

    /// Marks the page dirty without touching its contents.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn frame(&self) -> &BufferFrame {
        self.frame.as_deref().expect("page guard already released")
    }

    /// Unpins the page now instead of at scope exit. Calling this more
    /// than once is a no-op.
    pub fn release(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.pool.unpin_page(frame.page_id(), self.dirty);
        }
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// A pinned page held under its reader latch.
///
/// Dropping releases the latch first, then the pin.
pub struct ReadPageGuard<'a> {
    guard: PageGuard<'a>,
    latch: Option<ReadLatch>,
}

impl<'a> ReadPageGuard<'a> {
    pub(crate) fn new(pool: &'a BufferPool, frame: Arc<BufferFrame>) -> Self {
        let latch = frame.data().read_arc();
        Self {
            guard: PageGuard::new(pool, frame),
            latch: Some(latch),
        }
    }

    /// Page id of the guarded frame.
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Page contents, readable for the guard's lifetime.
    pub fn data(&self) -> &[u8] {
        self.latch.as_deref().expect("read guard already released")
    }

    /// Unlatches and unpins now instead of at scope exit. Calling this
    /// more than once is a no-op.
    pub fn release(&mut self) {
        self.latch.take();
        self.guard.release();
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A pinned page held under its writer latch.
///
/// Dropping releases the latch, forces the dirty flag, then unpins:
/// writers always mark the page dirty.
pub struct WritePageGuard<'a> {
    guard: PageGuard<'a>,
    latch: Option<WriteLatch>,
}

impl<'a> WritePageGuard<'a> {
    pub(crate) fn new(pool: &'a BufferPool, frame: Arc<BufferFrame>) -> Self {
        let latch = frame.data().write_arc();
        Self {
            guard: PageGuard::new(pool, frame),
            latch: Some(latch),
        }
    }

    /// Page id of the guarded frame.
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Page contents, readable for the guard's lifetime.
    pub fn data(&self) -> &[u8] {
        self.latch.as_deref().expect("write guard already released")
    }

    /// Page contents, writable for the guard's lifetime.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.latch
            .as_deref_mut()
            .expect("write guard already released")
    }

    /// Unlatches and unpins now instead of at scope exit. Calling this
    /// more than once is a no-op.
    pub fn release(&mut self) {
        if self.latch.take().is_some() {
            self.guard.mark_dirty();
        }
        self.guard.release();
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::super::config::BufferPoolConfig;
    use super::*;
    use crate::disk::{DiskManager, MemoryDiskManager};

    fn test_pool(num_frames: usize) -> BufferPool {
        let disk = Arc::new(MemoryDiskManager::new());
        BufferPool::new(
            BufferPoolConfig::new(num_frames),
            disk as Arc<dyn DiskManager>,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_basic_guard_unpins_on_drop() {
        let pool = test_pool(2);
        let page_id = {
            let guard = pool.new_page_guarded().unwrap();
            guard.page_id()
        };

        // Guard gone: pin released, page still resident and clean.
        let frame = pool.fetch_page(page_id).unwrap();
        assert_eq!(frame.pin_count(), 1);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_basic_guard_carries_dirty_flag() {
        let pool = test_pool(2);
        let page_id = {
            let mut guard = pool.new_page_guarded().unwrap();
            guard.data_mut()[0] = 0xaa;
            guard.page_id()
        };

        let frame = pool.fetch_page(page_id).unwrap();
        assert!(frame.is_dirty());
        assert_eq!(frame.read_data()[0], 0xaa);
    }

    #[test]
    fn test_release_is_idempotent() {
        let pool = test_pool(2);
        let frame = pool.new_page().unwrap();
        let page_id = frame.page_id();

        let mut guard = PageGuard::new(&pool, Arc::clone(&frame));
        assert_eq!(guard.page_id(), page_id);
        guard.release();
        guard.release();
        assert_eq!(guard.page_id(), PageId::INVALID);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_guard_move_transfers_ownership() {
        let pool = test_pool(2);
        let frame = pool.new_page().unwrap();
        let page_id = frame.page_id();

        let guard = pool.fetch_page_basic(page_id).unwrap();
        assert_eq!(frame.pin_count(), 2);

        let moved = guard;
        assert_eq!(moved.page_id(), page_id);
        drop(moved);
        // A single unpin for the one guard, however many moves it saw.
        assert_eq!(frame.pin_count(), 1);
    }

    #[test]
    fn test_write_guard_forces_dirty_on_drop() {
        let pool = test_pool(2);
        let frame = pool.new_page().unwrap();
        let page_id = frame.page_id();
        assert!(pool.unpin_page(page_id, false));

        {
            let guard = pool.fetch_page_write(page_id).unwrap();
            assert_eq!(guard.page_id(), page_id);
            // No write through the guard, but writers mark dirty anyway.
        }

        assert_eq!(frame.pin_count(), 0);
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_write_guard_data_round_trip() {
        let pool = test_pool(2);
        let page_id = {
            let frame = pool.new_page().unwrap();
            let page_id = frame.page_id();
            assert!(pool.unpin_page(page_id, false));
            page_id
        };

        {
            let mut guard = pool.fetch_page_write(page_id).unwrap();
            guard.data_mut()[0..3].copy_from_slice(&[7, 8, 9]);
        }
        {
            let guard = pool.fetch_page_read(page_id).unwrap();
            assert_eq!(&guard.data()[0..3], &[7, 8, 9]);
        }
    }

    #[test]
    fn test_concurrent_readers_share_the_latch() {
        let pool = test_pool(2);
        let page_id = {
            let frame = pool.new_page().unwrap();
            let page_id = frame.page_id();
            assert!(pool.unpin_page(page_id, false));
            page_id
        };

        let first = pool.fetch_page_read(page_id).unwrap();
        let second = pool.fetch_page_read(page_id).unwrap();
        assert_eq!(first.data(), second.data());
        drop(first);
        drop(second);

        let frame = pool.fetch_page(page_id).unwrap();
        assert_eq!(frame.pin_count(), 1);
    }

    #[test]
    fn test_read_guard_release_unlatches_before_unpin() {
        let pool = test_pool(2);
        let page_id = {
            let frame = pool.new_page().unwrap();
            let page_id = frame.page_id();
            assert!(pool.unpin_page(page_id, false));
            page_id
        };

        let mut guard = pool.fetch_page_read(page_id).unwrap();
        guard.release();
        guard.release();

        // Both the latch and the pin are gone: a writer gets through.
        let mut writer = pool.fetch_page_write(page_id).unwrap();
        writer.data_mut()[0] = 1;
    }
}
