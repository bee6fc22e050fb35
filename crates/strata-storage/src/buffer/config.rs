//! Buffer pool configuration.

use strata_common::constants::{DEFAULT_POOL_FRAMES, DEFAULT_REPLACER_K, MIN_POOL_FRAMES};

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of page frames in the buffer pool.
    pub num_frames: usize,
    /// History depth of the LRU-K replacement policy.
    pub replacer_k: usize,
}

impl BufferPoolConfig {
    /// Creates a configuration with the specified number of frames and the
    /// default replacer depth.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            replacer_k: DEFAULT_REPLACER_K,
        }
    }

    /// Sets the replacer history depth.
    pub fn with_replacer_k(mut self, replacer_k: usize) -> Self {
        self.replacer_k = replacer_k;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.num_frames < MIN_POOL_FRAMES {
            return Err("num_frames must be at least 1");
        }
        if self.replacer_k == 0 {
            return Err("replacer_k must be at least 1");
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_FRAMES)
    }
}
