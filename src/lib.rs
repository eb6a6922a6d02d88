//! StratumDB - the storage-engine substrate of a relational database:
//! a disk-backed buffer pool and an extendible hash index built on it.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        StratumDB                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │            Index Layer (index/)                      │   │
//! │  │   ExtendibleHashTable + Directory/Bucket views       │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                           ↓                                 │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │           Buffer Pool (buffer/)                      │   │
//! │  │   ParallelBufferPool → N × BufferPoolInstance        │   │
//! │  │   Frame + LruReplacer + PageGuards + Statistics      │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                           ↓                                 │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                   │   │
//! │  │           DiskManager + Page                         │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - shared primitives (PageId, FrameId, Rid, Error, config)
//! - [`buffer`] - buffer pool instances, sharding, eviction, guards
//! - [`storage`] - disk I/O and the raw page container
//! - [`index`] - the extendible hash table and its caller-supplied seams
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use stratumdb::buffer::BufferPoolInstance;
//! use stratumdb::index::hash::ExtendibleHashTable;
//! use stratumdb::index::key::{DefaultHashFunction, OrdComparator};
//! use stratumdb::storage::DiskManager;
//!
//! let disk = DiskManager::create("index.db").unwrap();
//! let pool = Arc::new(BufferPoolInstance::new(64, disk));
//!
//! let table: ExtendibleHashTable<i32, i32, _, _> =
//!     ExtendibleHashTable::new(pool, OrdComparator, DefaultHashFunction).unwrap();
//!
//! table.insert(&1, &100).unwrap();
//! let mut values = Vec::new();
//! assert!(table.get_value(&1, &mut values).unwrap());
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at the crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, FrameId, PageId, Result, Rid};

pub use buffer::{
    BufferPool, BufferPoolInstance, BufferPoolStats, Frame, PageReadGuard, PageWriteGuard,
    ParallelBufferPool, StatsSnapshot,
};
pub use index::hash::ExtendibleHashTable;
pub use storage::page::Page;
pub use storage::DiskManager;
