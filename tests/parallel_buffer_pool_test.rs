//! Parallel buffer pool tests.
//!
//! Routing, round-robin allocation, and cross-instance bookkeeping.

use std::sync::Arc;
use std::thread;

use stratumdb::buffer::ParallelBufferPool;
use stratumdb::common::{Error, PageId};
use stratumdb::storage::DiskManager;
use tempfile::tempdir;

fn create_pool(num_instances: u32, pool_size: usize) -> (ParallelBufferPool, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let dm = DiskManager::create(&path).unwrap();
    (ParallelBufferPool::new(num_instances, pool_size, dm), dir)
}

/// Page IDs route to the instance given by `id mod N`, and the instances
/// allocate striped IDs.
#[test]
fn test_routing_by_modulo() {
    let (pool, _dir) = create_pool(4, 1);

    let mut page_ids = Vec::new();
    for _ in 0..8 {
        let (pid, _frame) = pool.new_page().unwrap();
        pool.unpin_page(pid, false);
        page_ids.push(pid);
    }

    // Round-robin from instance 0: ids 0..8 in order.
    let expected: Vec<PageId> = (0..8).map(PageId::new).collect();
    assert_eq!(page_ids, expected);

    // IDs congruent mod 4 share an owning instance.
    for group in 0..4 {
        let a = pool.buffer_pool_for(PageId::new(group));
        let b = pool.buffer_pool_for(PageId::new(group + 4));
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.instance_index(), group as u32);
    }
    // Different residues get different instances.
    assert!(!std::ptr::eq(
        pool.buffer_pool_for(PageId::new(0)),
        pool.buffer_pool_for(PageId::new(1)),
    ));
}

#[test]
fn test_pool_size_is_total() {
    let (pool, _dir) = create_pool(4, 3);
    assert_eq!(pool.pool_size(), 12);
    assert_eq!(pool.num_instances(), 4);
}

/// The allocation cursor advances on failures too, so a pinned-full
/// instance does not starve the others.
#[test]
fn test_round_robin_skips_full_instances() {
    let (pool, _dir) = create_pool(2, 1);

    // Pin one page in each instance.
    let (p0, _) = pool.new_page().unwrap();
    let (p1, _) = pool.new_page().unwrap();
    assert_eq!(p0, PageId::new(0));
    assert_eq!(p1, PageId::new(1));

    assert!(matches!(pool.new_page(), Err(Error::PoolExhausted)));

    // Free instance 0 only; allocation must find it regardless of where
    // the cursor stopped.
    pool.unpin_page(p0, false);
    let (p2, _) = pool.new_page().unwrap();
    assert_eq!(p2, PageId::new(2));
    pool.unpin_page(p2, false);
    pool.unpin_page(p1, false);
}

/// Per-page operations work through the front-end exactly as on a single
/// instance.
#[test]
fn test_per_page_operations_route() {
    let (pool, _dir) = create_pool(4, 2);

    let (pid, frame) = pool.new_page().unwrap();
    frame.page_mut().as_mut_slice()[0] = 0x5A;
    pool.unpin_page(pid, true);

    assert!(pool.flush_page(pid).unwrap());

    let frame = pool.fetch_page(pid).unwrap();
    assert_eq!(frame.page().as_slice()[0], 0x5A);
    pool.unpin_page(pid, false);

    assert!(pool.delete_page(pid));
    assert!(!pool.buffer_pool_for(pid).contains_page(pid));

    // Sentinel handling at the front-end.
    assert!(!pool.unpin_page(PageId::INVALID, false));
    assert!(!pool.flush_page(PageId::INVALID).unwrap());
    assert!(pool.fetch_page(PageId::INVALID).is_err());
}

#[test]
fn test_flush_all_and_aggregate_stats() {
    let (pool, _dir) = create_pool(2, 4);

    for i in 0u8..6 {
        let (pid, frame) = pool.new_page().unwrap();
        frame.page_mut().as_mut_slice()[0] = i;
        pool.unpin_page(pid, true);
    }

    pool.flush_all_pages().unwrap();
    assert_eq!(pool.aggregate_stats().pages_written, 6);

    for i in 0u8..6 {
        let guard = pool.fetch_page_read(PageId::new(i as i32)).unwrap();
        assert_eq!(guard.as_slice()[0], i);
    }
    assert!(pool.aggregate_stats().cache_hits >= 6);
}

/// Data written through one instance is visible after eviction and refetch
/// through the shared file.
#[test]
fn test_shared_disk_manager_across_instances() {
    let (pool, _dir) = create_pool(2, 1);

    let (pid, frame) = pool.new_page().unwrap();
    frame.page_mut().as_mut_slice()[..4].copy_from_slice(b"ping");
    pool.unpin_page(pid, true);

    // Churn the owning instance until the page is evicted.
    let owner = pool.buffer_pool_for(pid);
    let (other, _) = owner.new_page().unwrap();
    owner.unpin_page(other, false);
    assert!(!owner.contains_page(pid));

    let guard = pool.fetch_page_read(pid).unwrap();
    assert_eq!(&guard.as_slice()[..4], b"ping");
}

/// Concurrent allocation hands out unique IDs.
#[test]
fn test_concurrent_allocation() {
    let (pool, _dir) = create_pool(4, 8);
    let pool = Arc::new(pool);

    let mut handles = vec![];
    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            let mut ids = Vec::new();
            for _ in 0..6 {
                let (pid, _) = pool.new_page().unwrap();
                pool.unpin_page(pid, false);
                ids.push(pid);
            }
            ids
        }));
    }

    let mut all: Vec<PageId> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort();
    let before = all.len();
    all.dedup();
    assert_eq!(all.len(), before);
}
