//! Immutable CHD tables.

use super::{
    format::Layout,
    hash::{inner_index, outer_index, RapidStringHash, StringHash},
    value::{Value, ValueMode},
    Error, Result,
};
use alloc::{borrow::Cow, vec::Vec};
use core::{fmt, marker::PhantomData};
use std::io::{Read, Write};
use varint_rs::VarintReader;

/// A static perfect hash table.
///
/// Maps a fixed set of byte-string keys to values. Built by [`Builder`](crate::Builder) or loaded
/// from bytes produced by [`Table::write`].
///
/// The table lives in its encoded form: lookups read seeds, indices, keys and values directly from
/// the underlying buffer. The buffer is either owned or borrowed, which is what the lifetime
/// parameter tracks; use `'static` for owned tables.
///
/// `S` is the string hash the table was built with. It has to match when loading.
pub struct Table<'a, S = RapidStringHash> {
    /// The encoded table.
    data: Cow<'a, [u8]>,

    /// Validated section positions within [`data`](Self::data).
    layout: Layout,

    /// Mark [`Table`] as using `S` without owning one.
    _marker: PhantomData<fn() -> S>,
}

impl<'a, S: StringHash> Table<'a, S> {
    /// Validate encoded bytes and wrap them into a table.
    fn from_data(data: Cow<'a, [u8]>) -> Result<Self> {
        let layout = Layout::parse(&data, S::ID)?;
        let table = Self {
            data,
            layout,
            _marker: PhantomData,
        };

        log::trace!(
            "loaded table: {} entries, {} slots, {} buckets, {} seeds",
            table.len(),
            table.size(),
            table.bucket_count(),
            table.layout.seed_count,
        );
        Ok(table)
    }

    /// Take ownership of freshly encoded bytes.
    #[cfg(feature = "build")]
    pub(crate) fn from_encoded(data: Vec<u8>) -> Result<Table<'static, S>> {
        Table::from_data(Cow::Owned(data))
    }

    /// Load a table from bytes produced by [`Table::write`].
    ///
    /// The buffer is validated once; afterwards lookups never fail or panic. If `writable` is
    /// `false`, the table borrows `buf` and reads everything from it in place, which is the mode
    /// to use for memory-mapped files. If `writable` is `true`, the bytes are copied into storage
    /// owned by the table, detaching it from `buf`.
    ///
    /// # Errors
    ///
    /// Fails if `buf` is not a table written by this version of the crate, if it was built with a
    /// different string hash than `S`, or if it is corrupt.
    #[inline]
    pub fn load_from_bytes(buf: &'a [u8], writable: bool) -> Result<Self> {
        if writable {
            Self::from_data(Cow::Owned(buf.to_vec()))
        } else {
            Self::from_data(Cow::Borrowed(buf))
        }
    }

    /// Read a whole table from a reader into owned storage.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and for the same reasons as [`Table::load_from_bytes`].
    #[inline]
    pub fn read_from(mut reader: impl Read) -> Result<Table<'static, S>> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Table::from_data(Cow::Owned(data))
    }

    /// Compute the slot `key` maps to.
    ///
    /// For keys in the table this is the slot holding the entry, and distinct keys get distinct
    /// slots. For other keys the result is arbitrary, or `None` if the key falls into an empty
    /// bucket.
    #[inline]
    pub fn slot(&self, key: &[u8]) -> Option<usize> {
        let data = &*self.data;
        let hash = S::hash(key);
        let outer_seed = self.layout.seed(data, 0);
        #[allow(
            clippy::cast_possible_truncation,
            reason = "outer hash < bucket_count <= usize::MAX"
        )]
        let bucket = outer_index(hash, outer_seed, self.layout.bucket_count as u64) as usize;
        let seed = self
            .layout
            .seed(data, usize::from(self.layout.index(data, bucket)?));
        #[allow(
            clippy::cast_possible_truncation,
            reason = "inner hash < size <= usize::MAX"
        )]
        Some(inner_index(hash, outer_seed, seed, self.layout.size as u64) as usize)
    }

    /// Check that every stored key sits in the slot it hashes to.
    ///
    /// Loading only validates the structure of the buffer, which keeps it independent of the
    /// number of entries. An entry in the wrong slot is unreachable by [`get`](Self::get); this
    /// rehashes every key to find such entries. Tables without keys always pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if some entry is misplaced.
    #[inline]
    pub fn verify(&self) -> Result<()> {
        for (slot, key, _) in self.iter() {
            if let Some(key) = key {
                if self.slot(key) != Some(slot) {
                    return Err(Error::Corrupt("misplaced entry"));
                }
            }
        }
        Ok(())
    }

    /// Look up the value stored for `key`.
    ///
    /// If the table stores keys, `None` is returned for every key that was not added. If it does
    /// not, a key that was never added may return the value of whichever key occupies its slot.
    #[inline]
    pub fn get(&self, key: &[u8]) -> Option<Value<'_>> {
        let slot = self.slot(key)?;
        if let Some(stored) = self.key_at(slot) {
            if stored != key {
                return None;
            }
        }
        self.value_at(slot)
    }

    /// Look up a byte value. Returns `None` for integer tables.
    #[inline]
    pub fn get_bytes(&self, key: &[u8]) -> Option<&[u8]> {
        self.get(key).and_then(Value::as_bytes)
    }

    /// Look up an integer value. Returns `None` for byte tables.
    #[inline]
    pub fn get_u64(&self, key: &[u8]) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// Check if the table has an entry for `key`.
    ///
    /// Subject to the same false positives as [`get`](Self::get) when keys are not stored.
    #[inline]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }
}

impl<S> Table<'_, S> {
    /// Get number of entries.
    #[inline]
    pub const fn len(&self) -> usize {
        self.layout.len
    }

    /// Check if the table is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the number of slots, `n`.
    #[inline]
    pub const fn size(&self) -> usize {
        self.layout.size
    }

    /// Get the number of buckets, `m`.
    #[inline]
    pub const fn bucket_count(&self) -> usize {
        self.layout.bucket_count
    }

    /// Check if keys are stored, i.e. if lookups of absent keys are guaranteed to miss.
    #[inline]
    pub const fn stores_keys(&self) -> bool {
        self.layout.store_keys
    }

    /// Get the kind of values the table holds.
    #[inline]
    pub const fn value_mode(&self) -> ValueMode {
        self.layout.mode
    }

    /// Iterate through the seed list `r`. The first seed is the outer seed.
    #[inline]
    pub fn seeds(&self) -> impl ExactSizeIterator<Item = u64> + '_ {
        (0..self.layout.seed_count).map(|index| self.layout.seed(&self.data, index))
    }

    /// Iterate through the seed index of every bucket. Empty buckets yield `None`.
    #[inline]
    pub fn indices(&self) -> impl ExactSizeIterator<Item = Option<u16>> + '_ {
        (0..self.layout.bucket_count).map(|bucket| self.layout.index(&self.data, bucket))
    }

    /// Get the key stored at `slot`.
    ///
    /// Returns `None` for empty slots, for out-of-range slots, and if keys are not stored.
    #[inline]
    pub fn key_at(&self, slot: usize) -> Option<&[u8]> {
        if slot >= self.size() || !self.layout.occupied(&self.data, slot) {
            return None;
        }
        self.layout.key(&self.data, slot)
    }

    /// Get the value stored at `slot`.
    ///
    /// Returns `None` for empty and out-of-range slots.
    #[inline]
    pub fn value_at(&self, slot: usize) -> Option<Value<'_>> {
        if slot >= self.size() || !self.layout.occupied(&self.data, slot) {
            return None;
        }
        let mut bytes = self.layout.value(&self.data, slot);
        match self.layout.mode {
            ValueMode::Bytes => Some(Value::Bytes(bytes)),
            // Varints were checked to be canonical during loading, so at most 10 bytes long
            ValueMode::UInt64 => bytes.read_u64_varint().ok().map(Value::UInt64),
        }
    }

    /// Iterate through occupied slots.
    ///
    /// Yields `(slot, key, value)`; the key is `None` if keys are not stored. Slots are visited in
    /// increasing order.
    #[inline]
    pub fn iter(&self) -> Iter<'_, S> {
        Iter {
            table: self,
            slot: 0,
        }
    }

    /// Get the encoded table.
    #[inline]
    pub fn to_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Serialize the table.
    ///
    /// The output can be loaded back with [`Table::load_from_bytes`] or [`Table::read_from`]. On
    /// error, whatever was written to `sink` should be discarded.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from `sink`.
    #[inline]
    pub fn write(&self, mut sink: impl Write) -> Result<()> {
        sink.write_all(&self.data)?;
        Ok(())
    }

    /// Detach the table from the buffer it was loaded from.
    #[inline]
    #[must_use]
    pub fn into_owned(self) -> Table<'static, S> {
        Table {
            data: Cow::Owned(self.data.into_owned()),
            layout: self.layout,
            _marker: PhantomData,
        }
    }
}

impl<S> Clone for Table<'_, S> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            layout: self.layout.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S> PartialEq for Table<'_, S> {
    /// Tables are equal if they have the same seeds, indices, keys and values. The encoding is
    /// canonical, so this compares the encoded bytes.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<S> Eq for Table<'_, S> {}

impl<S> fmt::Debug for Table<'_, S> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("len", &self.len())
            .field("size", &self.size())
            .field("bucket_count", &self.bucket_count())
            .field("seed_count", &self.layout.seed_count)
            .field("stores_keys", &self.stores_keys())
            .field("value_mode", &self.value_mode())
            .finish_non_exhaustive()
    }
}

/// Iterator over the occupied slots of a [`Table`], created by [`Table::iter`].
pub struct Iter<'t, S> {
    /// The table being iterated.
    table: &'t Table<'t, S>,
    /// Next slot to inspect.
    slot: usize,
}

impl<'t, S> Iterator for Iter<'t, S> {
    type Item = (usize, Option<&'t [u8]>, Value<'t>);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        while self.slot < self.table.size() {
            let slot = self.slot;
            self.slot = slot.saturating_add(1);
            if let Some(value) = self.table.value_at(slot) {
                return Some((slot, self.table.key_at(slot), value));
            }
        }
        None
    }
}
