//! Buffer Pool Instance - the core page caching layer.
//!
//! A [`BufferPoolInstance`] owns a fixed array of frames and mediates all
//! disk I/O for the pages assigned to it:
//! - Pin-based reference counting
//! - Lazy dirty-page write-back (at eviction or explicit flush)
//! - LRU eviction of unpinned frames, free frames first

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::buffer::page_guard::{PageReadGuard, PageWriteGuard};
use crate::buffer::replacer::LruReplacer;
use crate::buffer::{BufferPool, BufferPoolStats, Frame};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::DiskManager;

/// Bookkeeping guarded by the instance latch.
///
/// Invariants (hold whenever the latch is released):
/// - every frame is free, pinned, or evictable - never two at once
/// - |free_list| + |page_table| == pool_size
/// - the replacer never holds a frame with pin_count > 0
struct PoolState {
    /// Maps resident page IDs to frame indices.
    page_table: HashMap<PageId, FrameId>,

    /// Frames that have never held a page or were explicitly released.
    free_list: VecDeque<FrameId>,

    /// Evictable frames in least-recently-unpinned order.
    replacer: LruReplacer,

    /// Next page ID this instance will hand out.
    next_page_id: i32,
}

/// A fixed pool of frames caching disk pages.
///
/// Each public operation takes the instance latch for its entire duration,
/// disk I/O included. Several instances can share one disk manager when
/// composed into a parallel pool; page IDs are striped so instance `i` of
/// `N` allocates `i, i+N, i+2N, ...`.
pub struct BufferPoolInstance {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Page table, free list, replacer, and allocator under one latch.
    state: Mutex<PoolState>,

    /// Handles all disk I/O; shared between instances of a parallel pool.
    disk_manager: Arc<Mutex<DiskManager>>,

    /// Performance statistics.
    stats: BufferPoolStats,

    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
}

impl BufferPoolInstance {
    /// Create a standalone instance that owns every page ID.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        Self::with_instance(pool_size, 1, 0, Arc::new(Mutex::new(disk_manager)))
    }

    /// Create one member of an `num_instances`-way parallel pool.
    ///
    /// # Panics
    /// Panics if `pool_size` or `num_instances` is 0, or if
    /// `instance_index >= num_instances`.
    pub fn with_instance(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<Mutex<DiskManager>>,
    ) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        assert!(num_instances > 0, "num_instances must be > 0");
        assert!(
            instance_index < num_instances,
            "instance_index must be < num_instances"
        );

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list: VecDeque<FrameId> = (0..pool_size).map(FrameId::new).collect();

        Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(pool_size),
                next_page_id: instance_index as i32,
            }),
            disk_manager,
            stats: BufferPoolStats::new(),
            pool_size,
            num_instances,
            instance_index,
        }
    }

    // ========================================================================
    // Public API: the six core operations
    // ========================================================================

    /// Allocate a fresh page ID and install it in a frame.
    ///
    /// The returned frame is zeroed, clean, and pinned once; release it with
    /// [`unpin_page`](Self::unpin_page).
    ///
    /// # Errors
    /// `Error::PoolExhausted` if every frame is pinned.
    pub fn new_page(&self) -> Result<(PageId, &Frame)> {
        let mut state = self.state.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = self.allocate_page_id(&mut state);

        let frame = &self.frames[frame_id.0];
        frame.page_mut().reset();
        frame.set_page_id(page_id);
        frame.clear_dirty();
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);

        Ok((page_id, frame))
    }

    /// Pin a page, reading it from disk if it is not resident.
    ///
    /// # Errors
    /// - `Error::InvalidPageId` for the invalid sentinel
    /// - `Error::PoolExhausted` if a frame is needed and every frame is pinned
    pub fn fetch_page(&self, page_id: PageId) -> Result<&Frame> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.0];
            frame.pin();
            state.replacer.pin(frame_id);
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(frame);
        }

        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.0];

        {
            let mut page = frame.page_mut();
            if let Err(e) = self.disk_manager.lock().read_page(page_id, &mut page) {
                // Put the frame back rather than leaking it.
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        }
        self.stats.pages_read.fetch_add(1, Ordering::Relaxed);

        frame.set_page_id(page_id);
        frame.clear_dirty();
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);

        Ok(frame)
    }

    /// Drop one pin on a page.
    ///
    /// `is_dirty` ORs into the frame's dirty bit; it is never cleared here.
    /// Returns false if the page is not resident or its pin count is
    /// already 0.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.0];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.mark_dirty();
        }
        if frame.unpin() == 0 {
            state.replacer.unpin(frame_id);
        }
        true
    }

    /// Write a page back to disk if it is dirty, clearing the dirty bit.
    ///
    /// Pin state is unchanged. Returns `Ok(false)` if the page is not
    /// resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        self.flush_frame(frame_id, page_id)?;
        Ok(true)
    }

    /// Write every dirty resident page back to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();

        for (&page_id, &frame_id) in state.page_table.iter() {
            self.flush_frame(frame_id, page_id)?;
        }
        Ok(())
    }

    /// Remove a page from the pool and return its frame to the free list.
    ///
    /// Returns true if the page was not resident (nothing to do) or was
    /// deleted; false if it is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return false;
        }

        state.page_table.remove(&page_id);
        state.replacer.pin(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);

        self.disk_manager.lock().deallocate_page(page_id);
        true
    }

    // ========================================================================
    // Public API: RAII guards
    // ========================================================================

    /// Fetch a page and latch it in shared mode.
    ///
    /// The guard unpins the page (clean) when dropped.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageReadGuard::new(self, page_id, frame.page()))
    }

    /// Fetch a page and latch it in exclusive mode.
    ///
    /// The guard marks the page dirty and unpins it when dropped.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageWriteGuard::new(self, page_id, frame.page_mut()))
    }

    /// Allocate a new page and latch it in exclusive mode.
    pub fn new_page_write(&self) -> Result<PageWriteGuard<'_>> {
        let (page_id, frame) = self.new_page()?;
        Ok(PageWriteGuard::new(self, page_id, frame.page_mut()))
    }

    // ========================================================================
    // Public API: introspection
    // ========================================================================

    /// Number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// This instance's index within its parallel pool.
    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    /// Get buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Number of frames on the free list.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of resident pages.
    pub fn resident_page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Whether a page is resident.
    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Pin count of a resident page, or `None` if not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id.0].pin_count())
    }

    // ========================================================================
    // Internal: frame acquisition and write-back
    // ========================================================================

    /// Get a frame to install a page in: free list first, then eviction.
    ///
    /// On eviction the old page is written back if dirty and its mapping is
    /// erased. The returned frame is free and unpinned.
    fn acquire_frame(&self, state: &mut MutexGuard<'_, PoolState>) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = state.replacer.victim().ok_or(Error::PoolExhausted)?;
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);

        let frame = &self.frames[frame_id.0];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            self.flush_frame(frame_id, old_page_id)?;
        }

        state.page_table.remove(&old_page_id);
        frame.set_page_id(PageId::INVALID);

        Ok(frame_id)
    }

    /// Allocate the next striped page ID for this instance.
    fn allocate_page_id(&self, state: &mut MutexGuard<'_, PoolState>) -> PageId {
        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += self.num_instances as i32;
        debug_assert_eq!(
            page_id.0 as u32 % self.num_instances,
            self.instance_index,
            "allocated page IDs must route back to this instance"
        );
        page_id
    }

    /// Write a frame to disk if dirty and clear the dirty bit.
    fn flush_frame(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        if !frame.is_dirty() {
            return Ok(());
        }

        {
            let page = frame.page();
            self.disk_manager.lock().write_page(page_id, &page)?;
        }
        frame.clear_dirty();
        self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl BufferPool for BufferPoolInstance {
    fn new_page(&self) -> Result<(PageId, &Frame)> {
        BufferPoolInstance::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<&Frame> {
        BufferPoolInstance::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        BufferPoolInstance::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        BufferPoolInstance::flush_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<()> {
        BufferPoolInstance::flush_all_pages(self)
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        BufferPoolInstance::delete_page(self, page_id)
    }

    fn pool_size(&self) -> usize {
        BufferPoolInstance::pool_size(self)
    }
}
