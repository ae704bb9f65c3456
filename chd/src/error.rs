//! Construction and loading failures.

use super::value::ValueMode;
use alloc::vec::Vec;
use displaydoc::Display;
use thiserror::Error;

/// Errors produced while building, writing, or loading a table.
///
/// Lookups never fail: an absent key is reported as `None` rather than as an error.
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum Error {
    /// duplicate key {key:?}
    DuplicateKey {
        /// The key that was added more than once.
        key: Vec<u8>,
    },

    /// value for key {key:?} does not match the builder mode {expected:?}
    ValueModeMismatch {
        /// The offending key.
        key: Vec<u8>,
        /// The mode the builder was created with.
        expected: ValueMode,
    },

    /// no collision-free seed for bucket {bucket} of size {size} (keys: {keys:?})
    DisplacementExhausted {
        /// Index of the bucket that could not be placed.
        bucket: usize,
        /// Number of keys in the bucket.
        size: usize,
        /// The keys in the bucket.
        keys: Vec<Vec<u8>>,
    },

    /// {what} count {count} exceeds the limit of {limit}
    CapacityOverflow {
        /// Which quantity overflowed, e.g. `"bucket"` or `"seed"`.
        what: &'static str,
        /// The requested count.
        count: usize,
        /// The largest supported count.
        limit: usize,
    },

    /// I/O error: {0}
    Io(#[from] std::io::Error),

    /// not a CHD table (bad magic)
    BadMagic,

    /// unsupported format version {0}
    UnsupportedVersion(u8),

    /// table was built with string hash {found}, but loaded with string hash {expected}
    HashMismatch {
        /// Identifier of the hash the table is being loaded with.
        expected: u8,
        /// Identifier recorded in the table.
        found: u8,
    },

    /// corrupt table: {0}
    Corrupt(&'static str),
}

/// Result type for fallible table operations.
pub type Result<T> = core::result::Result<T, Error>;
