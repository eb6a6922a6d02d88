//! RAII guards for page access.
//!
//! These guards tie a pin to a page latch:
//! - [`PageReadGuard`] - shared access, unpins clean on drop
//! - [`PageWriteGuard`] - exclusive access, marks dirty and unpins on drop
//!
//! Drop releases the page latch *before* unpinning. The pool takes its
//! instance latch inside `unpin_page`, and may take page latches while
//! holding it (flush, eviction write-back); releasing in the other order
//! could close that cycle.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::buffer::buffer_pool_instance::BufferPoolInstance;
use crate::common::PageId;
use crate::storage::page::Page;

/// Guard for read-only page access.
///
/// Multiple read guards can exist for the same page simultaneously.
///
/// # Example
/// ```ignore
/// let guard = pool.fetch_page_read(page_id)?;
/// let data = guard.as_slice();
/// // guard drops here: latch released, page unpinned clean
/// ```
pub struct PageReadGuard<'a> {
    pool: &'a BufferPoolInstance,
    page_id: PageId,
    lock: Option<RwLockReadGuard<'a, Page>>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        pool: &'a BufferPoolInstance,
        page_id: PageId,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            pool,
            page_id,
            lock: Some(lock),
        }
    }

    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.lock.as_ref().expect("page latch already released")
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.take();
        self.pool.unpin_page(self.page_id, false);
    }
}

/// Guard for exclusive write access to a page.
///
/// Only one write guard can exist for a page at a time. The page is
/// unconditionally marked dirty when the guard drops; callers needing
/// finer dirty control use the explicit fetch/unpin operations instead.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPoolInstance,
    page_id: PageId,
    lock: Option<RwLockWriteGuard<'a, Page>>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        pool: &'a BufferPoolInstance,
        page_id: PageId,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            pool,
            page_id,
            lock: Some(lock),
        }
    }

    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.lock.as_ref().expect("page latch already released")
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.lock.as_mut().expect("page latch already released")
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.take();
        self.pool.unpin_page(self.page_id, true);
    }
}
