//! Buffer pool manager.
//!
//! The pool owns a fixed array of page frames and mediates every page
//! access: residency lookup, pinning, victim selection, and write-back.
//! One pool-wide mutex serializes all metadata mutation - the page table,
//! the free list, replacer invocations, and frame headers - and is held
//! across disk waits so that no second thread can rebind a frame to a
//! different page mid-transfer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_common::types::PageId;

use crate::disk::{DiskManager, DiskRequest, DiskScheduler};
use crate::log::LogManager;

use super::config::BufferPoolConfig;
use super::error::{BufferError, BufferResult};
use super::frame::{BufferFrame, FrameId};
use super::guard::{PageGuard, ReadPageGuard, WritePageGuard};
use super::replacer::{AccessType, LruKReplacer};
use super::BufferPoolStats;

/// Metadata guarded by the pool-wide latch.
struct PoolState {
    /// Maps resident pages to their frames.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page.
    free_list: Vec<FrameId>,
    /// Replacement policy over frame ids.
    replacer: LruKReplacer,
    /// Next page id to issue. Monotonic; deleted ids are never reused.
    next_page_id: u64,
}

/// Fixed-capacity cache of disk pages.
pub struct BufferPool {
    config: BufferPoolConfig,
    frames: Vec<Arc<BufferFrame>>,
    state: Mutex<PoolState>,
    scheduler: DiskScheduler,
    log_manager: Option<Arc<dyn LogManager>>,
    fetches: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    flushes: AtomicU64,
}

impl BufferPool {
    /// Creates a pool with `config.num_frames` frames backed by
    /// `disk_manager`.
    ///
    /// The optional log manager is carried for recovery integration; the
    /// caching core never calls it.
    pub fn new(
        config: BufferPoolConfig,
        disk_manager: Arc<dyn DiskManager>,
        log_manager: Option<Arc<dyn LogManager>>,
    ) -> BufferResult<Self> {
        config.validate().map_err(BufferError::config)?;

        let frames = (0..config.num_frames)
            .map(|i| Arc::new(BufferFrame::new(FrameId::new(i))))
            .collect();
        // Every frame starts free; popping from the back hands out low
        // frame ids first.
        let free_list = (0..config.num_frames).rev().map(FrameId::new).collect();
        let replacer = LruKReplacer::new(config.num_frames, config.replacer_k);

        Ok(Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(config.num_frames),
                free_list,
                replacer,
                next_page_id: PageId::FIRST.as_u64(),
            }),
            scheduler: DiskScheduler::new(disk_manager),
            log_manager,
            config,
            fetches: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        })
    }

    /// Allocates a zeroed page, pinned once.
    ///
    /// Fails with [`BufferError::NoFreeFrames`] when the free list is
    /// empty and no frame is evictable; no page id is consumed in that
    /// case.
    pub fn new_page(&self) -> BufferResult<Arc<BufferFrame>> {
        let mut state = self.state.lock();
        let frame_id = self.obtain_frame(&mut state)?;

        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += 1;

        let frame = &self.frames[frame_id.index()];
        frame.reset();
        frame.zero();
        frame.set_page_id(page_id);
        frame.pin();

        state.replacer.record_access(frame_id, AccessType::Unknown);
        state.replacer.set_evictable(frame_id, false);
        state.page_table.insert(page_id, frame_id);
        Ok(Arc::clone(frame))
    }

    /// Fetches `page_id`, pinning its frame.
    ///
    /// A resident page is returned directly; otherwise a frame is secured
    /// (free list, then eviction) and the page is read from disk before
    /// the call returns.
    pub fn fetch_page(&self, page_id: PageId) -> BufferResult<Arc<BufferFrame>> {
        self.fetch_page_with(page_id, AccessType::default())
    }

    /// [`fetch_page`](Self::fetch_page) with an explicit access origin for
    /// the replacement policy.
    pub fn fetch_page_with(
        &self,
        page_id: PageId,
        access: AccessType,
    ) -> BufferResult<Arc<BufferFrame>> {
        if !page_id.is_valid() {
            return Err(BufferError::InvalidPageId { page_id });
        }
        let mut state = self.state.lock();
        self.fetches.fetch_add(1, Ordering::Relaxed);

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            let frame = &self.frames[frame_id.index()];
            frame.pin();
            state.replacer.record_access(frame_id, access);
            state.replacer.set_evictable(frame_id, false);
            return Ok(Arc::clone(frame));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let frame_id = self.obtain_frame(&mut state)?;
        let frame = &self.frames[frame_id.index()];
        frame.reset();
        frame.zero();
        frame.set_page_id(page_id);
        frame.pin();

        if !self.schedule_io(false, frame) {
            frame.reset();
            state.free_list.push(frame_id);
            return Err(BufferError::ReadFailed { page_id });
        }

        state.replacer.record_access(frame_id, access);
        state.replacer.set_evictable(frame_id, false);
        state.page_table.insert(page_id, frame_id);
        Ok(Arc::clone(frame))
    }

    /// [`unpin_page`](Self::unpin_page) with an explicit access origin.
    /// The replacement policy does not currently consult it.
    pub fn unpin_page_with(&self, page_id: PageId, is_dirty: bool, _access: AccessType) -> bool {
        self.unpin_page(page_id, is_dirty)
    }

    /// Drops one pin on `page_id`, optionally marking it dirty.
    ///
    /// The dirty flag is sticky: `is_dirty == false` never clears it.
    /// Returns false if the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() == 0 {
            return false;
        }
        let remaining = frame.unpin();
        if is_dirty {
            frame.set_dirty(true);
        }
        if remaining == 0 {
            state.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Writes `page_id` out and clears its dirty flag, regardless of pin
    /// count. Returns false for the invalid sentinel, a non-resident
    /// page, or a failed write.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        if !page_id.is_valid() {
            return false;
        }
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.index()];
        if !self.schedule_io(true, frame) {
            return false;
        }
        frame.set_dirty(false);
        self.flushes.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Writes out every resident page. Frames holding no page are
    /// skipped; no ordering between pages is implied.
    pub fn flush_all_pages(&self) {
        let _state = self.state.lock();
        for frame in &self.frames {
            if !frame.page_id().is_valid() {
                continue;
            }
            if self.schedule_io(true, frame) {
                frame.set_dirty(false);
                self.flushes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drops `page_id` from the pool, discarding dirty contents without a
    /// flush.
    ///
    /// Returns true if the page is not resident (nothing to do) and false
    /// if it is still pinned. The freed page id is never reissued.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() > 0 {
            return false;
        }
        state.replacer.remove(frame_id);
        state.page_table.remove(&page_id);
        state.free_list.push(frame_id);
        frame.reset();
        frame.zero();
        Self::deallocate_page(&mut state, page_id);
        true
    }

    /// Allocates a page and wraps the pinned frame in a basic guard.
    pub fn new_page_guarded(&self) -> BufferResult<PageGuard<'_>> {
        let frame = self.new_page()?;
        Ok(PageGuard::new(self, frame))
    }

    /// Fetches a page and wraps the pinned frame in a basic guard.
    pub fn fetch_page_basic(&self, page_id: PageId) -> BufferResult<PageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageGuard::new(self, frame))
    }

    /// Fetches a page and holds its reader latch for the guard's lifetime.
    pub fn fetch_page_read(&self, page_id: PageId) -> BufferResult<ReadPageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(ReadPageGuard::new(self, frame))
    }

    /// Fetches a page and holds its writer latch for the guard's lifetime.
    pub fn fetch_page_write(&self, page_id: PageId) -> BufferResult<WritePageGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(WritePageGuard::new(self, frame))
    }

    /// Returns true if `page_id` is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// The pool configuration.
    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    /// The log manager handle passed at construction, if any.
    pub fn log_manager(&self) -> Option<&Arc<dyn LogManager>> {
        self.log_manager.as_ref()
    }

    /// A snapshot of pool counters and gauges.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned = 0;
        let mut dirty = 0;
        for frame in &self.frames {
            if frame.is_pinned() {
                pinned += 1;
            }
            if frame.is_dirty() {
                dirty += 1;
            }
        }
        BufferPoolStats {
            fetches: self.fetches.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            pinned_frames: pinned,
            dirty_frames: dirty,
        }
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// Secures a frame for a new occupant: free list first, then
    /// eviction. A dirty victim is written back before its page-table
    /// entry is removed and the frame recycled.
    fn obtain_frame(&self, state: &mut PoolState) -> BufferResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }
        let Some(frame_id) = state.replacer.evict() else {
            return Err(BufferError::NoFreeFrames);
        };

        let frame = &self.frames[frame_id.index()];
        let victim_page = frame.page_id();
        if frame.is_dirty() {
            tracing::debug!(page_id = %victim_page, frame_id = frame_id.index(),
                "writing back dirty victim");
            if !self.schedule_io(true, frame) {
                // Keep the page resident and evictable so pool state stays
                // consistent; the caller sees the failure.
                tracing::warn!(page_id = %victim_page, "victim write-back failed");
                state.replacer.record_access(frame_id, AccessType::Unknown);
                return Err(BufferError::WriteBackFailed {
                    page_id: victim_page,
                });
            }
        }
        state.page_table.remove(&victim_page);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        Ok(frame_id)
    }

    /// Schedules one transfer for `frame` and blocks on its completion.
    ///
    /// Callers hold the pool latch across the wait, which is what keeps
    /// the buffer stable while the worker touches it.
    fn schedule_io(&self, is_write: bool, frame: &BufferFrame) -> bool {
        let (promise, completion) = self.scheduler.create_promise();
        self.scheduler.schedule(DiskRequest {
            is_write,
            data: Arc::clone(frame.data()),
            page_id: frame.page_id(),
            done: promise,
        });
        completion.wait()
    }

    /// Allocator hook for a deleted page. Page ids are monotonic and
    /// never reissued, so there is nothing to reclaim.
    fn deallocate_page(_state: &mut PoolState, _page_id: PageId) {}
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("num_frames", &self.config.num_frames)
            .field("replacer_k", &self.config.replacer_k)
            .field("resident", &self.state.lock().page_table.len())
            .finish()
    }
}
