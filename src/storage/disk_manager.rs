//! Disk Manager - low-level file I/O for database pages.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing pages
//! - Allocating new page IDs
//! - Managing the database file

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// The database is stored as a single file with pages laid out sequentially;
/// page N lives at file offset `N × PAGE_SIZE`.
///
/// # Page ID Ownership
/// `allocate_page` hands out monotonically increasing IDs, but callers (the
/// buffer pool instances in particular) may compute their own IDs instead.
/// `write_page` therefore accepts any valid ID and extends the file as
/// needed, and `read_page` returns zeros for pages never written.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. Callers serialize access (the
/// buffer pool wraps it in a mutex).
pub struct DiskManager {
    file: File,
    /// One past the highest page ever written or allocated.
    page_count: u32,
}

impl DiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            page_count: 0,
        })
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let metadata = file.metadata()?;
        let page_count = (metadata.len() / PAGE_SIZE as u64) as u32;

        Ok(Self { file, page_count })
    }

    /// Open an existing database file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Read a page from disk into `page`.
    ///
    /// Reads of pages that were never written yield all zeros; a fresh page
    /// and a zeroed page are indistinguishable on disk.
    pub fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        let file_len = self.file.metadata()?.len();

        if offset >= file_len {
            page.reset();
            return Ok(());
        }

        self.file.seek(SeekFrom::Start(offset))?;

        // A well-formed file holds whole pages, but tolerate a short tail.
        let buf = page.as_mut_slice();
        let available = ((file_len - offset) as usize).min(PAGE_SIZE);
        self.file.read_exact(&mut buf[..available])?;
        buf[available..].fill(0);

        Ok(())
    }

    /// Write a page to disk, extending the file if the offset lies past the
    /// current end.
    ///
    /// # Durability
    /// This method calls `fsync()` after writing.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;
        self.file.sync_all()?;

        if page_id.0 as u32 >= self.page_count {
            self.page_count = page_id.0 as u32 + 1;
        }

        Ok(())
    }

    /// Reserve a new page ID.
    ///
    /// Buffer pool instances normally compute their own striped IDs and
    /// never call this; it exists for standalone use of the disk manager.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = PageId::new(self.page_count as i32);
        self.page_count += 1;
        Ok(page_id)
    }

    /// Hint that a page ID is no longer in use.
    ///
    /// The file is not shrunk and the ID is not recycled.
    pub fn deallocate_page(&mut self, page_id: PageId) {
        debug!("deallocate_page({}) - no-op", page_id);
    }

    /// One past the highest page ever written or allocated.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Total size of the database file in bytes, per the page count.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.page_count as u64) * (PAGE_SIZE as u64)
    }
}
