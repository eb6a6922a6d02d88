//! Key and value abstractions for disk-resident indexes.
//!
//! Index pages store keys and values as raw bytes, so the types the caller
//! supplies must encode to a fixed width. Comparison and hashing are also
//! caller-supplied: the index never assumes anything about key semantics
//! beyond what these traits provide.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::common::Rid;

/// A fixed-width value that can live inside an index page.
///
/// `WIDTH` bytes are reserved per instance; encoding is little-endian for
/// the provided integer impls.
pub trait Storable: Clone {
    /// Encoded size in bytes.
    const WIDTH: usize;

    /// Encode into the first `WIDTH` bytes of `buf`.
    fn write_to(&self, buf: &mut [u8]);

    /// Decode from the first `WIDTH` bytes of `buf`.
    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! impl_storable_int {
    ($($t:ty),* $(,)?) => {$(
        impl Storable for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn write_to(&self, buf: &mut [u8]) {
                buf[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
            }

            fn read_from(buf: &[u8]) -> Self {
                let mut bytes = [0u8; std::mem::size_of::<$t>()];
                bytes.copy_from_slice(&buf[..Self::WIDTH]);
                <$t>::from_le_bytes(bytes)
            }
        }
    )*};
}

impl_storable_int!(i32, u32, i64, u64);

impl Storable for Rid {
    const WIDTH: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        self.page_id.write_to(&mut buf[..4]);
        self.slot_num.write_to(&mut buf[4..8]);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            page_id: i32::read_from(&buf[..4]),
            slot_num: u32::read_from(&buf[4..8]),
        }
    }
}

/// Caller-supplied key ordering.
pub trait KeyComparator<K>: Clone + Send + Sync {
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering;
}

/// Comparator that defers to the key's `Ord` impl.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    #[inline]
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering {
        lhs.cmp(rhs)
    }
}

/// Caller-supplied hash function.
///
/// Only the low bits selected by the directory's global depth mask are ever
/// consumed, so 32 bits of output suffice.
pub trait HashFunction<K>: Clone + Send + Sync {
    fn hash_key(&self, key: &K) -> u32;
}

/// Hash function backed by the standard library's SipHash, downcast to
/// 32 bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHashFunction;

impl<K: Hash> HashFunction<K> for DefaultHashFunction {
    fn hash_key(&self, key: &K) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }
}
