//! LRU-K replacement policy.
//!
//! The replacer tracks every frame access and, when the pool is full,
//! selects the evictable frame with the largest backward K-distance: the
//! time since its K-th most recent access. Frames with fewer than K
//! accesses have a distance of +infinity and are preferred as victims.
//!
//! Rather than comparing timestamps, the replacer keeps two lists:
//!
//! - the **young list** holds frames with fewer than K accesses, ordered
//!   by first insertion (FIFO) - the head is the oldest newcomer;
//! - the **mature list** holds frames with K or more accesses, moved to
//!   the back on every touch (LRU) - the head is the coldest.
//!
//! Eviction scans young head to tail, then mature head to tail, and takes
//! the first evictable entry.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use super::frame::FrameId;

/// How a page access originated. Recorded with every access; the policy
/// itself does not currently distinguish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    /// Origin unknown.
    #[default]
    Unknown,
    /// Point lookup.
    Lookup,
    /// Sequential scan.
    Scan,
    /// Index traversal.
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    Young,
    Mature,
}

struct FrameRecord {
    /// Total accesses since the frame was last removed.
    count: usize,
    evictable: bool,
    /// Which list the frame currently sits on.
    queue: Queue,
}

struct ReplacerInner {
    records: HashMap<FrameId, FrameRecord>,
    /// Frames with fewer than K accesses, FIFO by first insertion.
    young: VecDeque<FrameId>,
    /// Frames with K or more accesses, most recently touched at the back.
    mature: VecDeque<FrameId>,
    /// Number of tracked frames currently evictable.
    evictable_count: usize,
}

impl ReplacerInner {
    fn unlink(&mut self, frame_id: FrameId, queue: Queue) {
        let list = match queue {
            Queue::Young => &mut self.young,
            Queue::Mature => &mut self.mature,
        };
        if let Some(pos) = list.iter().position(|&f| f == frame_id) {
            list.remove(pos);
        }
    }
}

/// Tracks access history for up to `num_frames` frames and picks eviction
/// victims by backward K-distance.
///
/// The replacer carries its own mutex: the pool invokes it under the pool
/// latch, but independent callers get the same consistency.
pub struct LruKReplacer {
    inner: Mutex<ReplacerInner>,
    num_frames: usize,
    k: usize,
}

impl LruKReplacer {
    /// Creates a replacer for frame ids in `[0, num_frames)` with history
    /// depth `k`.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "replacer K must be at least 1");
        Self {
            inner: Mutex::new(ReplacerInner {
                records: HashMap::with_capacity(num_frames),
                young: VecDeque::new(),
                mature: VecDeque::new(),
                evictable_count: 0,
            }),
            num_frames,
            k,
        }
    }

    fn check_bounds(&self, frame_id: FrameId) {
        assert!(
            frame_id.index() < self.num_frames,
            "frame id {} out of replacer bounds {}",
            frame_id.index(),
            self.num_frames
        );
    }

    /// Records an access to `frame_id`.
    ///
    /// An untracked frame starts on the young list with one access and is
    /// evictable; callers pinning the frame follow up with
    /// [`set_evictable`](Self::set_evictable).
    pub fn record_access(&self, frame_id: FrameId, _access: AccessType) {
        self.check_bounds(frame_id);
        let mut inner = self.inner.lock();

        let Some(record) = inner.records.get(&frame_id) else {
            let queue = if self.k == 1 {
                inner.mature.push_back(frame_id);
                Queue::Mature
            } else {
                inner.young.push_back(frame_id);
                Queue::Young
            };
            inner.records.insert(
                frame_id,
                FrameRecord {
                    count: 1,
                    evictable: true,
                    queue,
                },
            );
            inner.evictable_count += 1;
            return;
        };

        let (count, queue) = (record.count, record.queue);
        match queue {
            Queue::Mature => {
                // Refresh recency.
                inner.unlink(frame_id, Queue::Mature);
                inner.mature.push_back(frame_id);
            }
            Queue::Young if count + 1 >= self.k => {
                // Crossed the threshold: leave the young list for good.
                inner.unlink(frame_id, Queue::Young);
                inner.mature.push_back(frame_id);
                if let Some(record) = inner.records.get_mut(&frame_id) {
                    record.queue = Queue::Mature;
                }
            }
            Queue::Young => {}
        }
        if let Some(record) = inner.records.get_mut(&frame_id) {
            record.count += 1;
        }
    }

    /// Flips the evictable flag of a tracked frame. No-op if `frame_id` is
    /// untracked or the flag already matches.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        self.check_bounds(frame_id);
        let mut inner = self.inner.lock();
        let Some(record) = inner.records.get_mut(&frame_id) else {
            return;
        };
        if record.evictable == evictable {
            return;
        }
        record.evictable = evictable;
        if evictable {
            inner.evictable_count += 1;
        } else {
            inner.evictable_count -= 1;
        }
    }

    /// Selects and removes the frame with the largest backward K-distance
    /// among evictable frames, or `None` if no frame is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.evictable_count == 0 {
            return None;
        }

        let victim = Self::first_evictable(&inner.young, &inner.records)
            .or_else(|| Self::first_evictable(&inner.mature, &inner.records))?;

        let queue = inner.records.remove(&victim).map(|r| r.queue)?;
        inner.unlink(victim, queue);
        inner.evictable_count -= 1;
        Some(victim)
    }

    fn first_evictable(
        list: &VecDeque<FrameId>,
        records: &HashMap<FrameId, FrameRecord>,
    ) -> Option<FrameId> {
        list.iter()
            .find(|frame_id| records.get(frame_id).is_some_and(|r| r.evictable))
            .copied()
    }

    /// Drops all history for an evictable frame.
    ///
    /// No-op if the frame is untracked. Calling this on a non-evictable
    /// frame is a caller error and is ignored; the pool never removes a
    /// frame with outstanding pins.
    pub fn remove(&self, frame_id: FrameId) {
        self.check_bounds(frame_id);
        let mut inner = self.inner.lock();
        let Some(record) = inner.records.get(&frame_id) else {
            return;
        };
        if !record.evictable {
            return;
        }
        let queue = record.queue;
        inner.unlink(frame_id, queue);
        inner.records.remove(&frame_id);
        inner.evictable_count -= 1;
    }

    /// Number of tracked frames currently evictable.
    pub fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }
}

impl std::fmt::Debug for LruKReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LruKReplacer")
            .field("num_frames", &self.num_frames)
            .field("k", &self.k)
            .field("tracked", &inner.records.len())
            .field("evictable", &inner.evictable_count)
            .finish()
    }
}
