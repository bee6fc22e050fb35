//! System-wide constants for StrataDB.

// =============================================================================
// Page and Memory Constants
// =============================================================================

/// Page size in bytes (4 KB).
///
/// Fixed for the whole engine: every frame buffer and every disk transfer
/// is exactly this size.
pub const PAGE_SIZE: usize = 4 * 1024;

// =============================================================================
// Buffer Pool Constants
// =============================================================================

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_FRAMES: usize = 1024;

/// Minimum number of frames a buffer pool can be configured with.
pub const MIN_POOL_FRAMES: usize = 1;

/// Default history depth for the LRU-K replacement policy.
pub const DEFAULT_REPLACER_K: usize = 2;

// =============================================================================
// Disk Scheduling Constants
// =============================================================================

/// Capacity of the disk scheduler's bounded request queue.
///
/// Producers block once this many requests are in flight, which bounds
/// the memory pinned by outstanding I/O.
pub const DISK_QUEUE_DEPTH: usize = 64;
