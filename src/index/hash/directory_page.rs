//! Directory page of the extendible hash table.
//!
//! The directory is a single page mapping the low `global_depth` bits of a
//! key's hash to a bucket page. Entries sharing a bucket's suffix all point
//! at the same bucket page and carry the same local depth.
//!
//! # Layout
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     page_id (i32, this page's own ID)
//! 4       4     global_depth (u32)
//! 8       512   local_depths (u8 per entry)
//! 520     2048  bucket_page_ids (i32 per entry)
//! ```
//!
//! The page is interpreted in place through [`DirectoryView`] /
//! [`DirectoryViewMut`]; nothing is deserialized.

use std::collections::HashMap;

use crate::common::config::{DIRECTORY_ARRAY_SIZE, DIRECTORY_MAX_DEPTH, PAGE_SIZE};
use crate::common::PageId;

const PAGE_ID_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const LOCAL_DEPTHS_OFFSET: usize = 8;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;

const _: () = assert!(BUCKET_PAGE_IDS_OFFSET + 4 * DIRECTORY_ARRAY_SIZE <= PAGE_SIZE);

fn read_i32(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_i32(data: &mut [u8], offset: usize, value: i32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Read-only view over a directory page.
pub struct DirectoryView<'a> {
    data: &'a [u8],
}

impl<'a> DirectoryView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        debug_assert!(data.len() >= PAGE_SIZE);
        Self { data }
    }

    /// This directory page's own ID.
    pub fn page_id(&self) -> PageId {
        PageId::new(read_i32(self.data, PAGE_ID_OFFSET))
    }

    /// Number of low-order hash bits used to index the directory.
    pub fn global_depth(&self) -> u32 {
        read_i32(self.data, GLOBAL_DEPTH_OFFSET) as u32
    }

    /// Mask selecting the bits `global_depth` covers.
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    /// Number of valid entries (`2^global_depth`).
    pub fn size(&self) -> usize {
        1usize << self.global_depth()
    }

    /// Local depth of the bucket behind entry `bucket_idx`.
    pub fn local_depth(&self, bucket_idx: usize) -> u32 {
        debug_assert!(bucket_idx < DIRECTORY_ARRAY_SIZE);
        self.data[LOCAL_DEPTHS_OFFSET + bucket_idx] as u32
    }

    /// Mask selecting the bits `local_depth(bucket_idx)` covers.
    pub fn local_depth_mask(&self, bucket_idx: usize) -> u32 {
        (1u32 << self.local_depth(bucket_idx)) - 1
    }

    /// The highest bit inside the entry's local mask: `1 << (ld - 1)`,
    /// or 0 at depth 0. This bit decides which half of a split a key
    /// belongs to.
    pub fn local_high_bit(&self, bucket_idx: usize) -> u32 {
        (1u32 << self.local_depth(bucket_idx)) >> 1
    }

    /// Bucket page behind entry `bucket_idx`.
    pub fn bucket_page_id(&self, bucket_idx: usize) -> PageId {
        debug_assert!(bucket_idx < DIRECTORY_ARRAY_SIZE);
        PageId::new(read_i32(self.data, BUCKET_PAGE_IDS_OFFSET + 4 * bucket_idx))
    }

    /// The sibling entry produced or absorbed by a split: `bucket_idx`
    /// with its local high bit flipped.
    ///
    /// # Panics
    /// Panics if the entry's local depth is 0 (a depth-0 bucket has no
    /// sibling).
    pub fn split_image_index(&self, bucket_idx: usize) -> usize {
        let local_depth = self.local_depth(bucket_idx);
        assert!(local_depth > 0, "depth-0 bucket has no split image");
        bucket_idx ^ (1usize << (local_depth - 1))
    }

    /// True when every valid entry sits strictly below the global depth,
    /// so the upper half of the directory is redundant.
    pub fn can_shrink(&self) -> bool {
        if self.global_depth() == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.local_depth(i) < self.global_depth())
    }

    /// Assert the directory invariants.
    ///
    /// - every local depth is <= the global depth
    /// - each distinct bucket page is referenced by exactly
    ///   `2^(global_depth - local_depth)` entries
    /// - entries sharing a bucket page agree on local depth and share the
    ///   bucket's suffix
    pub fn verify_integrity(&self) {
        let global_depth = self.global_depth();
        let size = self.size();

        let mut reference_counts: HashMap<PageId, usize> = HashMap::new();
        let mut depths: HashMap<PageId, u32> = HashMap::new();
        let mut suffixes: HashMap<PageId, usize> = HashMap::new();

        for i in 0..size {
            let local_depth = self.local_depth(i);
            let page_id = self.bucket_page_id(i);
            assert!(
                local_depth <= global_depth,
                "local depth {} exceeds global depth {} at index {}",
                local_depth,
                global_depth,
                i
            );
            assert!(page_id.is_valid(), "invalid bucket page ID at index {}", i);

            *reference_counts.entry(page_id).or_insert(0) += 1;

            let suffix = i & ((1usize << local_depth) - 1);
            match depths.get(&page_id) {
                None => {
                    depths.insert(page_id, local_depth);
                    suffixes.insert(page_id, suffix);
                }
                Some(&depth) => {
                    assert_eq!(
                        depth, local_depth,
                        "local depth mismatch for {} at index {}",
                        page_id, i
                    );
                    assert_eq!(
                        suffixes[&page_id], suffix,
                        "suffix mismatch for {} at index {}",
                        page_id, i
                    );
                }
            }
        }

        for (page_id, &count) in &reference_counts {
            let expected = 1usize << (global_depth - depths[page_id]);
            assert_eq!(
                count, expected,
                "{} is referenced {} times, expected {}",
                page_id, count, expected
            );
        }
    }
}

/// Mutable view over a directory page.
pub struct DirectoryViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> DirectoryViewMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        debug_assert!(data.len() >= PAGE_SIZE);
        Self { data }
    }

    fn as_view(&self) -> DirectoryView<'_> {
        DirectoryView::new(self.data)
    }

    /// Initialize an empty directory: depth 0, every slot invalid.
    ///
    /// The single valid entry (index 0) still needs a bucket page assigned
    /// by the caller.
    pub fn init(&mut self, page_id: PageId) {
        write_i32(self.data, PAGE_ID_OFFSET, page_id.0);
        write_i32(self.data, GLOBAL_DEPTH_OFFSET, 0);
        for i in 0..DIRECTORY_ARRAY_SIZE {
            self.data[LOCAL_DEPTHS_OFFSET + i] = 0;
            write_i32(
                self.data,
                BUCKET_PAGE_IDS_OFFSET + 4 * i,
                PageId::INVALID.0,
            );
        }
    }

    pub fn page_id(&self) -> PageId {
        self.as_view().page_id()
    }

    pub fn global_depth(&self) -> u32 {
        self.as_view().global_depth()
    }

    pub fn global_depth_mask(&self) -> u32 {
        self.as_view().global_depth_mask()
    }

    pub fn size(&self) -> usize {
        self.as_view().size()
    }

    pub fn local_depth(&self, bucket_idx: usize) -> u32 {
        self.as_view().local_depth(bucket_idx)
    }

    pub fn local_depth_mask(&self, bucket_idx: usize) -> u32 {
        self.as_view().local_depth_mask(bucket_idx)
    }

    pub fn local_high_bit(&self, bucket_idx: usize) -> u32 {
        self.as_view().local_high_bit(bucket_idx)
    }

    pub fn bucket_page_id(&self, bucket_idx: usize) -> PageId {
        self.as_view().bucket_page_id(bucket_idx)
    }

    pub fn split_image_index(&self, bucket_idx: usize) -> usize {
        self.as_view().split_image_index(bucket_idx)
    }

    pub fn can_shrink(&self) -> bool {
        self.as_view().can_shrink()
    }

    pub fn set_local_depth(&mut self, bucket_idx: usize, local_depth: u32) {
        debug_assert!(bucket_idx < DIRECTORY_ARRAY_SIZE);
        debug_assert!(local_depth <= DIRECTORY_MAX_DEPTH);
        self.data[LOCAL_DEPTHS_OFFSET + bucket_idx] = local_depth as u8;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: usize) {
        let depth = self.local_depth(bucket_idx);
        self.set_local_depth(bucket_idx, depth + 1);
    }

    pub fn decr_local_depth(&mut self, bucket_idx: usize) {
        let depth = self.local_depth(bucket_idx);
        debug_assert!(depth > 0);
        self.set_local_depth(bucket_idx, depth - 1);
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: usize, bucket_page_id: PageId) {
        debug_assert!(bucket_idx < DIRECTORY_ARRAY_SIZE);
        write_i32(
            self.data,
            BUCKET_PAGE_IDS_OFFSET + 4 * bucket_idx,
            bucket_page_id.0,
        );
    }

    /// Double the directory: mirror every valid entry into the new upper
    /// half, then bump the global depth. Afterwards both halves route
    /// exactly as before and each bucket's sibling slot already holds the
    /// right pointer.
    ///
    /// # Panics
    /// Panics at the maximum depth.
    pub fn incr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        assert!(
            global_depth < DIRECTORY_MAX_DEPTH,
            "directory is at its maximum depth"
        );

        let size = self.size();
        for i in 0..size {
            self.set_bucket_page_id(i + size, self.bucket_page_id(i));
            self.set_local_depth(i + size, self.local_depth(i));
        }
        write_i32(self.data, GLOBAL_DEPTH_OFFSET, (global_depth + 1) as i32);
    }

    /// Halve the directory.
    ///
    /// Callers zero the upper half's local depths first (the entries stop
    /// being valid).
    pub fn decr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        debug_assert!(global_depth > 0);
        write_i32(self.data, GLOBAL_DEPTH_OFFSET, (global_depth - 1) as i32);
    }

    pub fn verify_integrity(&self) {
        self.as_view().verify_integrity();
    }
}
