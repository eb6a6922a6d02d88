//! Disk-resident extendible hash table.
//!
//! - [`ExtendibleHashTable`] - the table itself
//! - [`directory_page`] - routing page (global/local depths)
//! - [`bucket_page`] - fixed-slot (key, value) container

pub mod bucket_page;
pub mod directory_page;
mod extendible_hash_table;

pub use bucket_page::{bucket_array_size, BucketView, BucketViewMut};
pub use directory_page::{DirectoryView, DirectoryViewMut};
pub use extendible_hash_table::ExtendibleHashTable;
