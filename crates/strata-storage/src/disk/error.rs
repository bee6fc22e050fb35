//! Disk I/O errors.

use std::io;

use thiserror::Error;

/// Result type for disk operations.
pub type DiskResult<T> = Result<T, DiskError>;

/// Errors that can occur while reading or writing pages.
#[derive(Debug, Error)]
pub enum DiskError {
    /// Underlying I/O failure from the operating system.
    #[error("I/O error: {source}")]
    Io {
        /// The originating error.
        #[from]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: DiskError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, DiskError::Io { .. }));
        assert!(err.to_string().contains("gone"));
    }
}
