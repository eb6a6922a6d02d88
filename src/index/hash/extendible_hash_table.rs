//! Disk-resident extendible hash table.
//!
//! A directory page routes the low `global_depth` bits of each key's hash
//! to bucket pages; buckets split when full and merge when empty, growing
//! and shrinking the directory as needed. All pages live in a buffer pool
//! and are pinned only for the duration of each operation.
//!
//! # Latching
//! Two levels, always acquired in this order:
//! 1. the **table latch** - shared for lookups and in-place inserts and
//!    removes, exclusive for structural changes (split, merge)
//! 2. **page latches** - the per-frame `RwLock`, shared for reads and
//!    exclusive for writes
//!
//! Page latches are released before their pages are unpinned, and never
//! held across a buffer pool call that may evict.

use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::buffer::{BufferPool, Frame};
use crate::common::config::DIRECTORY_MAX_DEPTH;
use crate::common::{Error, PageId, Result};
use crate::index::hash::bucket_page::{bucket_array_size, BucketView, BucketViewMut};
use crate::index::hash::directory_page::{DirectoryView, DirectoryViewMut};
use crate::index::key::{HashFunction, KeyComparator, Storable};

enum InsertOutcome {
    /// Insert finished: true if stored, false if an exact duplicate.
    Done(bool),
    /// The target bucket was full; a split is needed.
    BucketFull,
}

/// Extendible hash table keyed by caller-supplied hash and comparison.
///
/// Multi-map semantics: one key may map to many distinct values, but an
/// exact (key, value) pair is stored at most once.
///
/// The table only keeps its directory's page ID in memory; persist that ID
/// (out of band) and hand it to [`open`](Self::open) to reattach to an
/// existing index.
pub struct ExtendibleHashTable<K, V, C, H> {
    buffer_pool: Arc<dyn BufferPool>,
    directory_page_id: PageId,
    bucket_capacity: usize,
    comparator: C,
    hash_fn: H,
    table_latch: RwLock<()>,
    _marker: PhantomData<fn(K, V)>,
}

impl<K, V, C, H> ExtendibleHashTable<K, V, C, H>
where
    K: Storable,
    V: Storable + PartialEq,
    C: KeyComparator<K>,
    H: HashFunction<K>,
{
    /// Create a new table: one directory page and one empty depth-0 bucket.
    ///
    /// Bucket capacity is derived from the page size and entry width.
    pub fn new(buffer_pool: Arc<dyn BufferPool>, comparator: C, hash_fn: H) -> Result<Self> {
        Self::with_bucket_capacity(
            buffer_pool,
            comparator,
            hash_fn,
            bucket_array_size(K::WIDTH + V::WIDTH),
        )
    }

    /// Create a new table with an explicit bucket capacity.
    ///
    /// Capacities below the derived maximum are mainly useful for forcing
    /// splits in tests; the same capacity must be passed when reopening.
    pub fn with_bucket_capacity(
        buffer_pool: Arc<dyn BufferPool>,
        comparator: C,
        hash_fn: H,
        bucket_capacity: usize,
    ) -> Result<Self> {
        assert!(bucket_capacity > 0, "bucket capacity must be > 0");
        assert!(
            bucket_capacity <= bucket_array_size(K::WIDTH + V::WIDTH),
            "bucket capacity does not fit in a page"
        );

        let (directory_page_id, directory_frame) = buffer_pool.new_page()?;
        let (bucket_page_id, _bucket_frame) = match buffer_pool.new_page() {
            Ok(result) => result,
            Err(e) => {
                buffer_pool.unpin_page(directory_page_id, false);
                return Err(e);
            }
        };

        {
            let mut page = directory_frame.page_mut();
            let mut directory = DirectoryViewMut::new(page.as_mut_slice());
            directory.init(directory_page_id);
            directory.set_bucket_page_id(0, bucket_page_id);
            directory.set_local_depth(0, 0);
        }

        // The new bucket page is already zeroed, which is a valid empty
        // bucket; mark both dirty so the initial state reaches disk.
        buffer_pool.unpin_page(bucket_page_id, true);
        buffer_pool.unpin_page(directory_page_id, true);

        Ok(Self {
            buffer_pool,
            directory_page_id,
            bucket_capacity,
            comparator,
            hash_fn,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// Reattach to an existing table by its directory page ID.
    pub fn open(
        buffer_pool: Arc<dyn BufferPool>,
        directory_page_id: PageId,
        comparator: C,
        hash_fn: H,
    ) -> Self {
        Self::open_with_bucket_capacity(
            buffer_pool,
            directory_page_id,
            comparator,
            hash_fn,
            bucket_array_size(K::WIDTH + V::WIDTH),
        )
    }

    /// Reattach with the explicit bucket capacity the table was built with.
    pub fn open_with_bucket_capacity(
        buffer_pool: Arc<dyn BufferPool>,
        directory_page_id: PageId,
        comparator: C,
        hash_fn: H,
        bucket_capacity: usize,
    ) -> Self {
        Self {
            buffer_pool,
            directory_page_id,
            bucket_capacity,
            comparator,
            hash_fn,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        }
    }

    /// The directory's page ID, for out-of-band persistence.
    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    /// Append every value stored under `key`. Returns true if at least one
    /// was found.
    pub fn get_value(&self, key: &K, result: &mut Vec<V>) -> Result<bool> {
        let _table = self.table_latch.read();
        let pool = &*self.buffer_pool;

        let directory_frame = pool.fetch_page(self.directory_page_id)?;
        let (_, bucket_page_id) = self.route(directory_frame, self.hash(key));

        let bucket_frame = match pool.fetch_page(bucket_page_id) {
            Ok(frame) => frame,
            Err(e) => {
                pool.unpin_page(self.directory_page_id, false);
                return Err(e);
            }
        };

        let found = {
            let page = bucket_frame.page();
            BucketView::<K, V>::new(page.as_slice(), self.bucket_capacity).get_value(
                key,
                &self.comparator,
                result,
            )
        };

        pool.unpin_page(bucket_page_id, false);
        pool.unpin_page(self.directory_page_id, false);
        Ok(found)
    }

    /// Insert a (key, value) pair, splitting buckets as needed.
    ///
    /// Returns `Ok(false)` if the exact pair is already present.
    ///
    /// # Errors
    /// `Error::DirectoryOverflow` when the keys at hand cannot be separated
    /// within the directory's maximum depth.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        let mut splits = 0;
        loop {
            match self.try_insert(key, value)? {
                InsertOutcome::Done(inserted) => return Ok(inserted),
                InsertOutcome::BucketFull => {
                    if splits >= DIRECTORY_MAX_DEPTH {
                        return Err(Error::DirectoryOverflow);
                    }
                    if self.split_bucket(key)? {
                        splits += 1;
                    }
                }
            }
        }
    }

    /// Remove the exact (key, value) pair. An emptied bucket is merged
    /// with its split image.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool> {
        let (removed, now_empty) = {
            let _table = self.table_latch.read();
            let pool = &*self.buffer_pool;

            let directory_frame = pool.fetch_page(self.directory_page_id)?;
            let (_, bucket_page_id) = self.route(directory_frame, self.hash(key));

            let bucket_frame = match pool.fetch_page(bucket_page_id) {
                Ok(frame) => frame,
                Err(e) => {
                    pool.unpin_page(self.directory_page_id, false);
                    return Err(e);
                }
            };

            let (removed, now_empty) = {
                let mut page = bucket_frame.page_mut();
                let mut bucket =
                    BucketViewMut::<K, V>::new(page.as_mut_slice(), self.bucket_capacity);
                let removed = bucket.remove(key, value, &self.comparator);
                (removed, bucket.is_empty())
            };

            pool.unpin_page(bucket_page_id, removed);
            pool.unpin_page(self.directory_page_id, false);
            (removed, now_empty)
        };

        if now_empty {
            self.merge(key)?;
        }
        Ok(removed)
    }

    /// Current global depth of the directory.
    pub fn global_depth(&self) -> Result<u32> {
        let _table = self.table_latch.read();
        let pool = &*self.buffer_pool;

        let directory_frame = pool.fetch_page(self.directory_page_id)?;
        let depth = {
            let page = directory_frame.page();
            DirectoryView::new(page.as_slice()).global_depth()
        };
        pool.unpin_page(self.directory_page_id, false);
        Ok(depth)
    }

    /// Assert the directory invariants.
    pub fn verify_integrity(&self) -> Result<()> {
        let _table = self.table_latch.read();
        let pool = &*self.buffer_pool;

        let directory_frame = pool.fetch_page(self.directory_page_id)?;
        {
            let page = directory_frame.page();
            DirectoryView::new(page.as_slice()).verify_integrity();
        }
        pool.unpin_page(self.directory_page_id, false);
        Ok(())
    }

    fn hash(&self, key: &K) -> u32 {
        self.hash_fn.hash_key(key)
    }

    /// Directory index and bucket page for a hash, read under the
    /// directory's page latch.
    fn route(&self, directory_frame: &Frame, hash: u32) -> (usize, PageId) {
        let page = directory_frame.page();
        let directory = DirectoryView::new(page.as_slice());
        let bucket_idx = (hash & directory.global_depth_mask()) as usize;
        (bucket_idx, directory.bucket_page_id(bucket_idx))
    }

    /// One shared-latch insert attempt.
    fn try_insert(&self, key: &K, value: &V) -> Result<InsertOutcome> {
        let _table = self.table_latch.read();
        let pool = &*self.buffer_pool;

        let directory_frame = pool.fetch_page(self.directory_page_id)?;
        let (_, bucket_page_id) = self.route(directory_frame, self.hash(key));

        let bucket_frame = match pool.fetch_page(bucket_page_id) {
            Ok(frame) => frame,
            Err(e) => {
                pool.unpin_page(self.directory_page_id, false);
                return Err(e);
            }
        };

        let outcome = {
            let mut page = bucket_frame.page_mut();
            let mut bucket = BucketViewMut::<K, V>::new(page.as_mut_slice(), self.bucket_capacity);
            if bucket.is_full() {
                InsertOutcome::BucketFull
            } else {
                InsertOutcome::Done(bucket.insert(key, value, &self.comparator))
            }
        };

        let dirtied = matches!(outcome, InsertOutcome::Done(true));
        pool.unpin_page(bucket_page_id, dirtied);
        pool.unpin_page(self.directory_page_id, false);
        Ok(outcome)
    }

    /// Split the bucket `key` routes to, under the exclusive table latch.
    ///
    /// Returns `Ok(false)` without splitting if the bucket is no longer
    /// full (another thread got here first); the caller then retries its
    /// insert.
    fn split_bucket(&self, key: &K) -> Result<bool> {
        let _table = self.table_latch.write();
        let pool = &*self.buffer_pool;
        let hash = self.hash(key);

        let directory_frame = pool.fetch_page(self.directory_page_id)?;
        let (bucket_idx, bucket_page_id) = self.route(directory_frame, hash);

        let bucket_frame = match pool.fetch_page(bucket_page_id) {
            Ok(frame) => frame,
            Err(e) => {
                pool.unpin_page(self.directory_page_id, false);
                return Err(e);
            }
        };

        let still_full = {
            let page = bucket_frame.page();
            BucketView::<K, V>::new(page.as_slice(), self.bucket_capacity).is_full()
        };
        if !still_full {
            pool.unpin_page(bucket_page_id, false);
            pool.unpin_page(self.directory_page_id, false);
            return Ok(false);
        }

        let local_depth = {
            let page = directory_frame.page();
            DirectoryView::new(page.as_slice()).local_depth(bucket_idx)
        };
        if local_depth >= DIRECTORY_MAX_DEPTH {
            pool.unpin_page(bucket_page_id, false);
            pool.unpin_page(self.directory_page_id, false);
            return Err(Error::DirectoryOverflow);
        }

        // Allocate the split image before latching any page.
        let (new_page_id, new_frame) = match pool.new_page() {
            Ok(result) => result,
            Err(e) => {
                pool.unpin_page(bucket_page_id, false);
                pool.unpin_page(self.directory_page_id, false);
                return Err(e);
            }
        };

        {
            let mut directory_page = directory_frame.page_mut();
            let mut directory = DirectoryViewMut::new(directory_page.as_mut_slice());

            if directory.local_depth(bucket_idx) == directory.global_depth() {
                directory.incr_global_depth();
                debug!(
                    "hash directory doubled to global depth {}",
                    directory.global_depth()
                );
            }

            directory.incr_local_depth(bucket_idx);
            let new_depth = directory.local_depth(bucket_idx);
            let sibling_idx = directory.split_image_index(bucket_idx);

            // Every entry carrying the bucket's old suffix is redirected to
            // one of the two halves by its new high bit.
            let mask = directory.local_depth_mask(bucket_idx) as usize;
            for i in 0..directory.size() {
                if i & mask == bucket_idx & mask {
                    directory.set_bucket_page_id(i, bucket_page_id);
                    directory.set_local_depth(i, new_depth);
                } else if i & mask == sibling_idx & mask {
                    directory.set_bucket_page_id(i, new_page_id);
                    directory.set_local_depth(i, new_depth);
                }
            }

            // Rehash: slots whose discriminating bit matches the sibling
            // move over; the rest stay put.
            let high_bit = directory.local_high_bit(bucket_idx);
            let sibling_bit = sibling_idx as u32 & high_bit;

            let mut old_page = bucket_frame.page_mut();
            let mut new_page = new_frame.page_mut();
            let mut old_bucket =
                BucketViewMut::<K, V>::new(old_page.as_mut_slice(), self.bucket_capacity);
            let mut new_bucket =
                BucketViewMut::<K, V>::new(new_page.as_mut_slice(), self.bucket_capacity);

            for slot in 0..self.bucket_capacity {
                if !old_bucket.is_readable(slot) {
                    continue;
                }
                let slot_key = old_bucket.key_at(slot);
                if self.hash(&slot_key) & high_bit == sibling_bit {
                    let slot_value = old_bucket.value_at(slot);
                    let moved = new_bucket.insert(&slot_key, &slot_value, &self.comparator);
                    debug_assert!(moved, "split image cannot fill up during rehash");
                    old_bucket.remove_at(slot);
                }
            }

            debug!(
                "split {} (index {}) -> {} (index {}) at local depth {}",
                bucket_page_id, bucket_idx, new_page_id, sibling_idx, new_depth
            );
        }

        pool.unpin_page(new_page_id, true);
        pool.unpin_page(bucket_page_id, true);
        pool.unpin_page(self.directory_page_id, true);
        Ok(true)
    }

    /// Fold an empty bucket into its split image, under the exclusive
    /// table latch. Aborts quietly if the landscape changed while waiting.
    fn merge(&self, key: &K) -> Result<()> {
        let _table = self.table_latch.write();
        let pool = &*self.buffer_pool;
        let hash = self.hash(key);

        let directory_frame = pool.fetch_page(self.directory_page_id)?;
        let (bucket_idx, bucket_page_id) = self.route(directory_frame, hash);

        // Merging is only sound if the pair still sits at equal, non-zero
        // local depth.
        let mergeable = {
            let page = directory_frame.page();
            let directory = DirectoryView::new(page.as_slice());
            let local_depth = directory.local_depth(bucket_idx);
            local_depth > 0 && {
                let sibling_idx = directory.split_image_index(bucket_idx);
                directory.local_depth(sibling_idx) == local_depth
            }
        };
        if !mergeable {
            pool.unpin_page(self.directory_page_id, false);
            return Ok(());
        }

        let bucket_frame = match pool.fetch_page(bucket_page_id) {
            Ok(frame) => frame,
            Err(e) => {
                pool.unpin_page(self.directory_page_id, false);
                return Err(e);
            }
        };
        let is_empty = {
            let page = bucket_frame.page();
            BucketView::<K, V>::new(page.as_slice(), self.bucket_capacity).is_empty()
        };
        pool.unpin_page(bucket_page_id, false);

        if !is_empty {
            pool.unpin_page(self.directory_page_id, false);
            return Ok(());
        }

        let deleted = pool.delete_page(bucket_page_id);
        debug_assert!(deleted, "empty bucket must be unpinned before deletion");

        {
            let mut directory_page = directory_frame.page_mut();
            let mut directory = DirectoryViewMut::new(directory_page.as_mut_slice());

            let sibling_idx = directory.split_image_index(bucket_idx);
            let sibling_page_id = directory.bucket_page_id(sibling_idx);

            directory.set_bucket_page_id(bucket_idx, sibling_page_id);
            directory.decr_local_depth(bucket_idx);
            directory.decr_local_depth(sibling_idx);

            // The survivor inherits the sibling's identity: every entry
            // pointing at either page converges on it.
            let merged_depth = directory.local_depth(sibling_idx);
            for i in 0..directory.size() {
                let target = directory.bucket_page_id(i);
                if target == bucket_page_id || target == sibling_page_id {
                    directory.set_bucket_page_id(i, sibling_page_id);
                    directory.set_local_depth(i, merged_depth);
                }
            }

            while directory.can_shrink() {
                let size = directory.size();
                for i in size / 2..size {
                    directory.set_local_depth(i, 0);
                }
                directory.decr_global_depth();
            }

            debug!(
                "merged {} (index {}) into {} (index {})",
                bucket_page_id, bucket_idx, sibling_page_id, sibling_idx
            );
        }

        pool.unpin_page(self.directory_page_id, true);
        Ok(())
    }
}
