//! Write-ahead log handle.
//!
//! The buffer pool accepts an optional log manager at construction and
//! carries it for recovery integration. The caching core itself never
//! calls into it.

use strata_common::types::Lsn;

/// Handle to a write-ahead log implementation.
pub trait LogManager: Send + Sync {
    /// Highest log sequence number known to be durable on stable storage.
    fn durable_lsn(&self) -> Lsn;
}
