//! Bitmap API.

#[cfg(feature = "build")]
use alloc::{vec, vec::Vec};

/// Bit-compressed [`Vec<bool>`].
///
/// Used for the set of claimed slots during construction and for slot occupancy in the encoded
/// table.
#[cfg(feature = "build")]
pub struct BitMap {
    /// Underlying container.
    ///
    /// Bit `index` is stored in byte `index / 8` at bit `index % 8`, counting from LSB.
    data: Vec<u8>,
}

#[cfg(feature = "build")]
impl BitMap {
    /// Create a bitmap of a given length, filled with zero bits.
    pub fn new_zeros(len: usize) -> Self {
        Self {
            data: vec![0; byte_len(len)],
        }
    }

    /// Set the bit at `index` to one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize) {
        self.data[index / 8] |= 1 << (index % 8);
    }

    /// Get the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> bool {
        get_bit(&self.data, index)
    }

    /// The underlying bytes, in the layout documented on [`data`](Self::data).
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Number of bytes needed to store `len` bits.
pub const fn byte_len(len: usize) -> usize {
    len.div_ceil(8)
}

/// Read bit `index` from a byte slice in [`BitMap`] layout.
///
/// # Panics
///
/// Panics if `index / 8` is out of bounds.
pub fn get_bit(data: &[u8], index: usize) -> bool {
    (data[index / 8] >> (index % 8)) & 1 == 1
}
