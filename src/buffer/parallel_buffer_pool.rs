//! Parallel buffer pool - a sharded front-end over independent instances.
//!
//! Each page ID is owned by exactly one [`BufferPoolInstance`], chosen by
//! `page_id mod num_instances`. Per-page operations go straight to the
//! owning instance; only new-page allocation takes a latch here, to rotate
//! allocation pressure across instances.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::buffer_pool_instance::BufferPoolInstance;
use crate::buffer::page_guard::{PageReadGuard, PageWriteGuard};
use crate::buffer::{BufferPool, Frame, StatsSnapshot};
use crate::common::{Error, PageId, Result};
use crate::storage::DiskManager;

/// An array of independent buffer pool instances sharing one disk manager.
pub struct ParallelBufferPool {
    instances: Vec<BufferPoolInstance>,

    /// Round-robin cursor for new-page allocation; the only PBP latch.
    next_instance: Mutex<usize>,

    num_instances: u32,
    pool_size_each: usize,
}

impl ParallelBufferPool {
    /// Create `num_instances` instances of `pool_size` frames each.
    ///
    /// # Panics
    /// Panics if `num_instances` or `pool_size` is 0.
    pub fn new(num_instances: u32, pool_size: usize, disk_manager: DiskManager) -> Self {
        assert!(num_instances > 0, "num_instances must be > 0");

        let disk_manager = Arc::new(Mutex::new(disk_manager));
        let instances = (0..num_instances)
            .map(|index| {
                BufferPoolInstance::with_instance(
                    pool_size,
                    num_instances,
                    index,
                    Arc::clone(&disk_manager),
                )
            })
            .collect();

        Self {
            instances,
            next_instance: Mutex::new(0),
            num_instances,
            pool_size_each: pool_size,
        }
    }

    /// The instance responsible for a page ID.
    pub fn buffer_pool_for(&self, page_id: PageId) -> &BufferPoolInstance {
        let index = (page_id.0 as u32 % self.num_instances) as usize;
        &self.instances[index]
    }

    /// Number of instances in the pool.
    pub fn num_instances(&self) -> u32 {
        self.num_instances
    }

    /// Allocate a new page from some instance.
    ///
    /// Instances are tried round-robin from a rotating cursor; the cursor
    /// advances on every attempt, successful or not, so allocation pressure
    /// spreads even when some instances are full.
    ///
    /// # Errors
    /// `Error::PoolExhausted` after a full cycle with no instance able to
    /// allocate.
    pub fn new_page(&self) -> Result<(PageId, &Frame)> {
        let mut cursor = self.next_instance.lock();

        for _ in 0..self.num_instances {
            let instance = &self.instances[*cursor];
            *cursor = (*cursor + 1) % self.num_instances as usize;

            match instance.new_page() {
                Ok(result) => return Ok(result),
                Err(Error::PoolExhausted) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::PoolExhausted)
    }

    /// Pin a page via its owning instance.
    pub fn fetch_page(&self, page_id: PageId) -> Result<&Frame> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        self.buffer_pool_for(page_id).fetch_page(page_id)
    }

    /// Unpin a page via its owning instance.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        if !page_id.is_valid() {
            return false;
        }
        self.buffer_pool_for(page_id).unpin_page(page_id, is_dirty)
    }

    /// Flush a page via its owning instance.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }
        self.buffer_pool_for(page_id).flush_page(page_id)
    }

    /// Flush every dirty page in every instance.
    pub fn flush_all_pages(&self) -> Result<()> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    /// Delete a page via its owning instance.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        if !page_id.is_valid() {
            return true;
        }
        self.buffer_pool_for(page_id).delete_page(page_id)
    }

    /// Total frames across all instances.
    pub fn pool_size(&self) -> usize {
        self.num_instances as usize * self.pool_size_each
    }

    /// Fetch a page with a shared-latch guard.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        self.buffer_pool_for(page_id).fetch_page_read(page_id)
    }

    /// Fetch a page with an exclusive-latch guard.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        self.buffer_pool_for(page_id).fetch_page_write(page_id)
    }

    /// Statistics summed across all instances.
    pub fn aggregate_stats(&self) -> StatsSnapshot {
        self.instances
            .iter()
            .fold(StatsSnapshot::default(), |acc, instance| {
                acc.merge(&instance.stats().snapshot())
            })
    }
}

impl BufferPool for ParallelBufferPool {
    fn new_page(&self) -> Result<(PageId, &Frame)> {
        ParallelBufferPool::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<&Frame> {
        ParallelBufferPool::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        ParallelBufferPool::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        ParallelBufferPool::flush_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<()> {
        ParallelBufferPool::flush_all_pages(self)
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        ParallelBufferPool::delete_page(self, page_id)
    }

    fn pool_size(&self) -> usize {
        ParallelBufferPool::pool_size(self)
    }
}
