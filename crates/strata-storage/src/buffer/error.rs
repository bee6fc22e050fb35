//! Buffer pool errors.

use strata_common::types::PageId;
use thiserror::Error;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during buffer pool operations.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Free list empty and every tracked frame is pinned.
    #[error("no free frames available, all pages are pinned")]
    NoFreeFrames,

    /// Operation on the invalid page-id sentinel.
    #[error("invalid page ID: {page_id}")]
    InvalidPageId {
        /// The offending id.
        page_id: PageId,
    },

    /// The disk read backing a fetch miss failed.
    #[error("disk read for page {page_id} failed")]
    ReadFailed {
        /// The page that could not be loaded.
        page_id: PageId,
    },

    /// Write-back of a dirty eviction victim failed.
    #[error("write-back of page {page_id} failed")]
    WriteBackFailed {
        /// The page whose contents could not be persisted.
        page_id: PageId,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// What was wrong.
        message: String,
    },
}

impl BufferError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a transient error that can be retried once
    /// pins are released.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoFreeFrames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(BufferError::NoFreeFrames.is_retryable());
        assert!(!BufferError::ReadFailed {
            page_id: PageId::new(1)
        }
        .is_retryable());
    }

    #[test]
    fn test_display() {
        let err = BufferError::config("bad frame count");
        assert!(err.to_string().contains("bad frame count"));
    }
}
