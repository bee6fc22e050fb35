//! Disk manager implementations.
//!
//! A [`DiskManager`] moves fixed-size pages between memory and backing
//! storage. Both operations are synchronous and block until complete; the
//! scheduler worker is the only caller on the hot path.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use strata_common::constants::PAGE_SIZE;
use strata_common::types::PageId;

use super::error::{DiskError, DiskResult};

/// Moves fixed-size pages between memory and backing storage.
///
/// Buffers handed to either operation are exactly [`PAGE_SIZE`] bytes.
pub trait DiskManager: Send + Sync {
    /// Reads the page at `page_id` into `buf`, blocking until complete.
    ///
    /// Reading a page that was never written yields zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()>;

    /// Writes `buf` as the contents of the page at `page_id`, blocking
    /// until complete.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> DiskResult<()>;
}

/// File-backed disk manager.
///
/// Pages live at `page_id * PAGE_SIZE` in a single data file. The file
/// grows on demand; reads past the current end of file are zero-filled.
pub struct FileDiskManager {
    file: Mutex<File>,
    path: PathBuf,
}

impl FileDiskManager {
    /// Opens (or creates) the data file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DiskResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn offset(page_id: PageId) -> u64 {
        page_id.as_u64() * PAGE_SIZE as u64
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        debug_assert!(page_id.is_valid());

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::offset(page_id)))?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled < buf.len() {
            // Reading past the end of file: the page was allocated but
            // never written back, so its tail is all zeroes.
            tracing::debug!(page_id = %page_id, "short read, zero-filling page tail");
            buf[filled..].fill(0);
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> DiskResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        debug_assert!(page_id.is_valid());

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::offset(page_id)))?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for FileDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDiskManager")
            .field("path", &self.path)
            .finish()
    }
}

/// One operation observed by the [`MemoryDiskManager`] journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskOp {
    /// A page read.
    Read(PageId),
    /// A page write.
    Write(PageId),
}

#[derive(Default)]
struct MemoryInner {
    pages: HashMap<PageId, Box<[u8]>>,
    journal: Vec<DiskOp>,
}

/// In-memory disk manager.
///
/// Backs pages with a hash map and journals every operation so tests can
/// observe exactly which transfers reached the disk channel. Reads and
/// writes can be made to fail on demand to drive the error paths.
#[derive(Default)]
pub struct MemoryDiskManager {
    inner: Mutex<MemoryInner>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryDiskManager {
    /// Creates an empty in-memory disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the operations performed so far, oldest first. Failed
    /// attempts are not journaled.
    pub fn journal(&self) -> Vec<DiskOp> {
        self.inner.lock().journal.clone()
    }

    /// Returns a copy of the stored contents of `page_id`, if any write
    /// ever reached it.
    pub fn page(&self, page_id: PageId) -> Option<Box<[u8]>> {
        self.inner.lock().pages.get(&page_id).cloned()
    }

    /// Makes subsequent reads fail until cleared.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    /// Makes subsequent writes fail until cleared.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    fn injected_failure(op: &str) -> DiskError {
        io::Error::new(io::ErrorKind::Other, format!("injected {op} failure")).into()
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(Self::injected_failure("read"));
        }
        let mut inner = self.inner.lock();
        inner.journal.push(DiskOp::Read(page_id));
        match inner.pages.get(&page_id) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> DiskResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(Self::injected_failure("write"));
        }
        let mut inner = self.inner.lock();
        inner.journal.push(DiskOp::Write(page_id));
        inner.pages.insert(page_id, buf.into());
        Ok(())
    }
}

impl std::fmt::Debug for MemoryDiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryDiskManager")
            .field("pages", &inner.pages.len())
            .field("ops", &inner.journal.len())
            .finish()
    }
}
