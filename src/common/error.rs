//! Error types for StratumDB.

use std::fmt;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in StratumDB.
///
/// A single error type keeps error handling consistent across the buffer
/// pool, disk manager, and index layers.
#[derive(Debug)]
pub enum Error {
    /// I/O error from disk operations.
    Io(std::io::Error),

    /// Every frame in the buffer pool is pinned; no victim can be chosen.
    PoolExhausted,

    /// The provided page ID is the invalid sentinel or out of range.
    InvalidPageId(i32),

    /// A bucket split would push the hash directory past its maximum
    /// global depth.
    DirectoryOverflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::PoolExhausted => write!(f, "all buffer pool frames are pinned"),
            Error::InvalidPageId(pid) => write!(f, "invalid page ID: {}", pid),
            Error::DirectoryOverflow => {
                write!(f, "hash directory reached its maximum global depth")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
