//! Table values.

/// How values are stored in a table.
///
/// Every table stores values of exactly one kind, fixed when its [`Builder`](crate::Builder) is
/// created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(
    clippy::exhaustive_enums,
    reason = "the two modes are part of the binary format"
)]
pub enum ValueMode {
    /// Opaque byte strings.
    Bytes,
    /// Unsigned 64-bit integers, stored as LEB128 varints.
    UInt64,
}

/// A value read from a table.
///
/// Byte values borrow from the table's storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(
    clippy::exhaustive_enums,
    reason = "the two modes are part of the binary format"
)]
pub enum Value<'a> {
    /// A byte string value.
    Bytes(&'a [u8]),
    /// An integer value.
    UInt64(u64),
}

impl<'a> Value<'a> {
    /// Get the byte string, if this is a byte value.
    #[inline]
    #[must_use]
    pub const fn as_bytes(self) -> Option<&'a [u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::UInt64(_) => None,
        }
    }

    /// Get the integer, if this is an integer value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> Option<u64> {
        match self {
            Self::Bytes(_) => None,
            Self::UInt64(x) => Some(x),
        }
    }

    /// The mode this value belongs to.
    #[inline]
    #[must_use]
    pub const fn mode(self) -> ValueMode {
        match self {
            Self::Bytes(_) => ValueMode::Bytes,
            Self::UInt64(_) => ValueMode::UInt64,
        }
    }
}

/// A value owned by a builder until the table is encoded.
#[cfg(feature = "build")]
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PendingValue {
    /// Added with [`Builder::add`](crate::Builder::add).
    Bytes(alloc::vec::Vec<u8>),
    /// Added with [`Builder::add_uvarint64`](crate::Builder::add_uvarint64).
    UInt64(u64),
}

#[cfg(feature = "build")]
impl PendingValue {
    /// The mode this value belongs to.
    pub(crate) const fn mode(&self) -> ValueMode {
        match self {
            Self::Bytes(_) => ValueMode::Bytes,
            Self::UInt64(_) => ValueMode::UInt64,
        }
    }
}
