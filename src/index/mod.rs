//! Index structures.
//!
//! - [`hash`] - disk-resident extendible hash table
//! - [`key`] - codec, comparator, and hash seams supplied by the caller

pub mod hash;
pub mod key;
