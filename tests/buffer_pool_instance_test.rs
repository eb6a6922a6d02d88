//! Buffer pool instance tests.
//!
//! Pin accounting, eviction, write-back, and guard behavior against a real
//! on-disk file.

use std::sync::Arc;
use std::thread;

use stratumdb::buffer::BufferPoolInstance;
use stratumdb::common::{Error, PageId};
use stratumdb::storage::DiskManager;
use tempfile::tempdir;

fn create_pool(pool_size: usize) -> (BufferPoolInstance, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let dm = DiskManager::create(&path).unwrap();
    (BufferPoolInstance::new(pool_size, dm), dir)
}

fn copy_string(data: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    data[..bytes.len()].copy_from_slice(bytes);
    data[bytes.len()] = 0;
}

fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

/// Pin exhaustion: a full pool of pinned pages refuses a fifth page until
/// one pin is dropped.
#[test]
fn test_pin_exhaustion() {
    let (pool, _dir) = create_pool(4);

    let mut page_ids = Vec::new();
    for _ in 0..4 {
        let (page_id, _frame) = pool.new_page().unwrap();
        page_ids.push(page_id);
    }

    // Four distinct IDs.
    let mut unique = page_ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 4);

    assert!(matches!(pool.new_page(), Err(Error::PoolExhausted)));

    assert!(pool.unpin_page(page_ids[0], false));
    let (page_id, _frame) = pool.new_page().unwrap();
    assert_eq!(page_id, PageId::new(4));
}

/// Dirty write-back on eviction: data written before an eviction survives
/// the round trip through disk.
#[test]
fn test_dirty_writeback_on_eviction() {
    let (pool, _dir) = create_pool(4);

    let (page0, frame) = pool.new_page().unwrap();
    copy_string(frame.page_mut().as_mut_slice(), "hello");
    pool.unpin_page(page0, true);

    // Exhaust the pool; the last allocation evicts page 0.
    for _ in 0..4 {
        let (pid, _) = pool.new_page().unwrap();
        pool.unpin_page(pid, false);
    }
    assert!(!pool.contains_page(page0));

    let frame = pool.fetch_page(page0).unwrap();
    assert_eq!(read_string(frame.page().as_slice()), "hello");
    pool.unpin_page(page0, false);
}

/// Evict-reload: repeated eviction cycles never lose dirty data.
#[test]
fn test_persistence_across_eviction_cycles() {
    let (pool, _dir) = create_pool(2);

    let mut page_ids = Vec::new();
    for i in 0u8..6 {
        let (pid, frame) = pool.new_page().unwrap();
        frame.page_mut().as_mut_slice()[0] = i;
        frame.page_mut().as_mut_slice()[1] = i.wrapping_mul(3);
        pool.unpin_page(pid, true);
        page_ids.push(pid);
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let frame = pool.fetch_page(pid).unwrap();
        assert_eq!(frame.page().as_slice()[0], i as u8);
        assert_eq!(frame.page().as_slice()[1], (i as u8).wrapping_mul(3));
        pool.unpin_page(pid, false);
    }
}

/// A fetch miss with every frame pinned also reports exhaustion.
#[test]
fn test_fetch_miss_with_all_frames_pinned() {
    let (pool, _dir) = create_pool(2);

    // Put a page on disk, then evict it.
    let (victim, frame) = pool.new_page().unwrap();
    frame.page_mut().as_mut_slice()[0] = 9;
    pool.unpin_page(victim, true);

    let (p1, _) = pool.new_page().unwrap();
    let (p2, _) = pool.new_page().unwrap();
    assert!(!pool.contains_page(victim));

    assert!(matches!(pool.fetch_page(victim), Err(Error::PoolExhausted)));

    pool.unpin_page(p1, false);
    pool.unpin_page(p2, false);
    let frame = pool.fetch_page(victim).unwrap();
    assert_eq!(frame.page().as_slice()[0], 9);
    pool.unpin_page(victim, false);
}

/// Write guards mark pages dirty; read guards observe the data.
#[test]
fn test_page_guards_roundtrip() {
    let (pool, _dir) = create_pool(4);

    let pid = {
        let mut guard = pool.new_page_write().unwrap();
        copy_string(guard.as_mut_slice(), "guarded");
        guard.page_id()
    };
    assert_eq!(pool.pin_count(pid), Some(0));

    {
        let guard = pool.fetch_page_read(pid).unwrap();
        assert_eq!(read_string(guard.as_slice()), "guarded");
    }

    // The write guard marked the page dirty; it survives eviction.
    for _ in 0..4 {
        let (p, _) = pool.new_page().unwrap();
        pool.unpin_page(p, false);
    }
    let guard = pool.fetch_page_read(pid).unwrap();
    assert_eq!(read_string(guard.as_slice()), "guarded");
}

/// Multiple read guards share the latch; pin counts add up.
#[test]
fn test_multiple_read_guards() {
    let (pool, _dir) = create_pool(4);

    let (pid, _) = pool.new_page().unwrap();
    pool.unpin_page(pid, false);

    let guard1 = pool.fetch_page_read(pid).unwrap();
    let guard2 = pool.fetch_page_read(pid).unwrap();
    assert_eq!(guard1.page_id(), guard2.page_id());
    assert_eq!(pool.pin_count(pid), Some(2));

    drop(guard1);
    drop(guard2);
    assert_eq!(pool.pin_count(pid), Some(0));
}

/// Flushing a pinned page must not deadlock against its holder, and the
/// second of two back-to-back flushes writes nothing.
#[test]
fn test_flush_semantics() {
    let (pool, _dir) = create_pool(4);

    let (pid, frame) = pool.new_page().unwrap();
    frame.page_mut().as_mut_slice()[0] = 0xAA;
    pool.unpin_page(pid, true);

    pool.fetch_page(pid).unwrap();
    assert!(pool.flush_page(pid).unwrap());
    assert!(pool.flush_page(pid).unwrap());
    assert_eq!(pool.stats().snapshot().pages_written, 1);
    // Flushing leaves the pin in place.
    assert_eq!(pool.pin_count(pid), Some(1));
    pool.unpin_page(pid, false);
}

#[test]
fn test_flush_all_pages() {
    let (pool, _dir) = create_pool(8);

    for i in 0u8..5 {
        let (pid, frame) = pool.new_page().unwrap();
        frame.page_mut().as_mut_slice()[0] = i;
        pool.unpin_page(pid, true);
    }

    pool.flush_all_pages().unwrap();
    assert_eq!(pool.stats().snapshot().pages_written, 5);
}

/// Frame-state invariant: a page with pin count zero is either evictable
/// or free, and deletion moves it to the free list.
#[test]
fn test_delete_returns_frame_to_free_list() {
    let (pool, _dir) = create_pool(3);

    let (pid, _) = pool.new_page().unwrap();
    assert!(!pool.delete_page(pid));

    pool.unpin_page(pid, false);
    assert!(pool.delete_page(pid));
    assert_eq!(pool.free_frame_count(), 3);
    assert_eq!(pool.resident_page_count(), 0);
}

/// Concurrent readers all see the same bytes.
#[test]
fn test_concurrent_reads() {
    let (pool, _dir) = create_pool(8);
    let pool = Arc::new(pool);

    let (pid, frame) = pool.new_page().unwrap();
    frame.page_mut().as_mut_slice()[0] = 0x42;
    pool.unpin_page(pid, true);

    let mut handles = vec![];
    for _ in 0..8 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                let guard = pool.fetch_page_read(pid).unwrap();
                assert_eq!(guard.as_slice()[0], 0x42);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(pool.pin_count(pid), Some(0));
}

/// Concurrent writers to distinct pages settle to their last values.
#[test]
fn test_concurrent_writers() {
    let (pool, _dir) = create_pool(8);
    let pool = Arc::new(pool);

    let page_ids: Vec<PageId> = (0..4)
        .map(|_| {
            let (pid, _) = pool.new_page().unwrap();
            pool.unpin_page(pid, false);
            pid
        })
        .collect();

    let mut handles = vec![];
    for (i, &pid) in page_ids.iter().enumerate() {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for j in 0..50 {
                let mut guard = pool.fetch_page_write(pid).unwrap();
                guard.as_mut_slice()[0] = ((i * 50 + j) % 256) as u8;
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = pool.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], ((i * 50 + 49) % 256) as u8);
    }
}

/// Holding one page's latch while fetching another must not deadlock.
#[test]
fn test_latch_coupling_no_deadlock() {
    let (pool, _dir) = create_pool(8);
    let pool = Arc::new(pool);

    let (pid0, _) = pool.new_page().unwrap();
    let (pid1, _) = pool.new_page().unwrap();
    pool.unpin_page(pid0, false);
    pool.unpin_page(pid1, false);

    let guard0 = pool.fetch_page_write(pid0).unwrap();

    let pool_clone = Arc::clone(&pool);
    let child = thread::spawn(move || {
        // Blocks until the main thread releases page 0.
        let _guard = pool_clone.fetch_page_write(pid0).unwrap();
    });

    // While holding page 0, take page 1.
    let _guard1 = pool.fetch_page_write(pid1).unwrap();

    drop(guard0);
    child.join().unwrap();
}

/// Reopening the file sees everything that was flushed.
#[test]
fn test_flush_and_reload_across_pools() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let data = b"persistent!";
    let pid;

    {
        let dm = DiskManager::create(&path).unwrap();
        let pool = BufferPoolInstance::new(8, dm);

        let mut guard = pool.new_page_write().unwrap();
        pid = guard.page_id();
        guard.as_mut_slice()[..data.len()].copy_from_slice(data);
        drop(guard);

        pool.flush_all_pages().unwrap();
    }

    {
        let dm = DiskManager::open(&path).unwrap();
        let pool = BufferPoolInstance::new(8, dm);

        let guard = pool.fetch_page_read(pid).unwrap();
        assert_eq!(&guard.as_slice()[..data.len()], data);
    }
}
