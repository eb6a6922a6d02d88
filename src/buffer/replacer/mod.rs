//! Eviction policy implementations (replacers).
//!
//! Currently implements:
//! - [`LruReplacer`] - least-recently-unpinned eviction

mod lru;

pub use lru::LruReplacer;
