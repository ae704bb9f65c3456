//! Binary table format.
//!
//! All integers are little-endian. Nothing is aligned; fields are read with unaligned loads, so a
//! table can be used from any byte buffer.
//!
//! ```text
//! header   magic "CHDT" | version: u8 | string hash id: u8 | flags: u8 | reserved: u8
//!          size n: u64 | bucket count m: u64 | seed count: u64
//! seeds    [u64; seed count]          r[0] is the outer seed
//! indices  [u16; m]                   seed index per bucket, 0xffff for empty buckets
//! occupied [u8; ceil(n / 8)]          bit j is set iff slot j holds an entry
//! keys     [u64; n + 1], blob         only if FLAG_STORE_KEYS; offsets into the blob
//! values   [u64; n + 1], blob         byte strings, or LEB128 varints if FLAG_UVARINT
//! ```
//!
//! Unoccupied slots have empty key and value ranges. The encoding is canonical: equal tables
//! have equal bytes.

#![allow(
    clippy::arithmetic_side_effects,
    reason = "offsets are bounds-checked during parsing"
)]

use super::{bitmap, value::ValueMode, Error, Result};
use byteorder::{ByteOrder, LittleEndian as LE};
use core::ops::Range;
use varint_rs::{VarintReader, VarintWriter};

/// File magic.
pub const MAGIC: [u8; 4] = *b"CHDT";

/// Current format version.
pub const VERSION: u8 = 1;

/// Size of the fixed header.
pub const HEADER_LEN: usize = 32;

/// Keys are stored, so lookups of absent keys can be rejected.
pub const FLAG_STORE_KEYS: u8 = 1 << 0;

/// Values are LEB128-encoded integers rather than byte strings.
pub const FLAG_UVARINT: u8 = 1 << 1;

/// On-disk marker for a bucket without a seed.
pub const UNUSED_BUCKET: u16 = u16::MAX;

/// Largest bucket count; bucket indices must fit in 16 bits.
pub const MAX_BUCKETS: usize = 1 << 16;

/// Largest seed count; `UNUSED_BUCKET` is not a valid seed index.
pub const MAX_SEEDS: usize = u16::MAX as usize;

/// Longest LEB128 encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// Decode a value stored in [`FLAG_UVARINT`] mode.
///
/// Accepts only the shortest encoding of a value that spans all of `bytes`.
pub fn decode_varint(bytes: &[u8]) -> Option<u64> {
    // The decoder does not bound its shift, so overlong input must not reach it
    if bytes.len() > MAX_VARINT_LEN {
        return None;
    }
    let mut reader = bytes;
    let value = reader.read_u64_varint().ok()?;
    if !reader.is_empty() {
        return None;
    }
    let mut canonical = [0; MAX_VARINT_LEN];
    let mut writer = &mut canonical[..];
    writer.write_u64_varint(value).ok()?;
    let len = MAX_VARINT_LEN - writer.len();
    (canonical[..len] == *bytes).then_some(value)
}

/// Positions of the sections of a validated table within its buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    /// Whether keys are stored.
    pub store_keys: bool,

    /// How values are encoded.
    pub mode: ValueMode,

    /// Number of slots, `n`.
    pub size: usize,

    /// Number of buckets, `m`.
    pub bucket_count: usize,

    /// Number of seeds in `r`.
    pub seed_count: usize,

    /// Number of occupied slots.
    pub len: usize,

    /// Start of the seed array.
    seeds: usize,

    /// Start of the bucket index array.
    indices: usize,

    /// The occupancy bitmap.
    occupied: Range<usize>,

    /// Key entries, if stored.
    keys: Option<Entries>,

    /// Value entries.
    values: Entries,
}

/// A variable-length entry per slot: `n + 1` offsets followed by a blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Entries {
    /// Start of the offset array.
    offsets: usize,
    /// Start of the blob.
    blob: usize,
}

impl Entries {
    /// Byte range of the entry at `slot`, relative to the buffer.
    fn range(self, data: &[u8], slot: usize) -> Range<usize> {
        let at = self.offsets + slot * 8;
        #[allow(
            clippy::cast_possible_truncation,
            reason = "offsets were checked to lie within the buffer"
        )]
        let (start, end) = (
            LE::read_u64(&data[at..]) as usize,
            LE::read_u64(&data[at + 8..]) as usize,
        );
        self.blob + start..self.blob + end
    }
}

/// Sequential, bounds-checked section allocation over a buffer.
struct Sections {
    /// Start of the next section.
    position: usize,
    /// Total buffer length.
    len: usize,
}

impl Sections {
    /// Claim the next `count * width` bytes.
    fn take(&mut self, count: usize, width: usize) -> Result<Range<usize>> {
        let end = count
            .checked_mul(width)
            .and_then(|bytes| self.position.checked_add(bytes))
            .filter(|&end| end <= self.len)
            .ok_or(Error::Corrupt("section out of bounds"))?;
        let range = self.position..end;
        self.position = end;
        Ok(range)
    }

    /// Claim an offset array for `size` slots plus the blob it points into.
    ///
    /// Offsets must start at zero and never decrease. Unoccupied slots must be empty.
    fn take_entries(&mut self, data: &[u8], size: usize, occupied: &[u8]) -> Result<Entries> {
        let offsets = self.take(size + 1, 8)?;
        let offset_at = |slot: usize| LE::read_u64(&data[offsets.start + slot * 8..]);

        if offset_at(0) != 0 {
            return Err(Error::Corrupt("first entry offset is not zero"));
        }
        for slot in 0..size {
            let (start, end) = (offset_at(slot), offset_at(slot + 1));
            if end < start {
                return Err(Error::Corrupt("entry offsets decrease"));
            }
            if end > start && !bitmap::get_bit(occupied, slot) {
                return Err(Error::Corrupt("entry in unoccupied slot"));
            }
        }

        let blob_len =
            usize::try_from(offset_at(size)).map_err(|_| Error::Corrupt("blob too large"))?;
        let blob = self.take(blob_len, 1)?;
        Ok(Entries {
            offsets: offsets.start,
            blob: blob.start,
        })
    }
}

/// Convert a header count to `usize`, rejecting zero and values above `limit`.
fn count(data: &[u8], at: usize, limit: usize, what: &'static str) -> Result<usize> {
    usize::try_from(LE::read_u64(&data[at..]))
        .ok()
        .filter(|&count| count > 0 && count <= limit)
        .ok_or(Error::Corrupt(what))
}

impl Layout {
    /// Validate a buffer and locate its sections.
    ///
    /// `hash_id` is the identifier of the string hash the caller will query the table with.
    ///
    /// After this succeeds, every accessor on the returned layout is in bounds for `data`.
    pub fn parse(data: &[u8], hash_id: u8) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::Corrupt("truncated header"));
        }
        if data[..4] != MAGIC {
            return Err(Error::BadMagic);
        }
        if data[4] != VERSION {
            return Err(Error::UnsupportedVersion(data[4]));
        }
        if data[5] != hash_id {
            return Err(Error::HashMismatch {
                expected: hash_id,
                found: data[5],
            });
        }
        let flags = data[6];
        if flags & !(FLAG_STORE_KEYS | FLAG_UVARINT) != 0 || data[7] != 0 {
            return Err(Error::Corrupt("unknown flags"));
        }

        // Slot offsets are multiplied by 8 later on, so keep the size well within usize
        let size = count(data, 8, usize::MAX / 16, "bad table size")?;
        let bucket_count = count(data, 16, MAX_BUCKETS, "bad bucket count")?;
        let seed_count = count(data, 24, MAX_SEEDS, "bad seed count")?;
        if size < bucket_count {
            return Err(Error::Corrupt("fewer slots than buckets"));
        }

        let mut sections = Sections {
            position: HEADER_LEN,
            len: data.len(),
        };
        let seeds = sections.take(seed_count, 8)?;
        let indices = sections.take(bucket_count, 2)?;
        let occupied = sections.take(bitmap::byte_len(size), 1)?;

        for bucket in 0..bucket_count {
            let index = LE::read_u16(&data[indices.start + bucket * 2..]);
            if index != UNUSED_BUCKET && usize::from(index) >= seed_count {
                return Err(Error::Corrupt("seed index out of range"));
            }
        }

        let occupied_bits = &data[occupied.clone()];
        let len = (0..size)
            .filter(|&slot| bitmap::get_bit(occupied_bits, slot))
            .count();
        if size % 8 != 0 && occupied_bits[size / 8] >> (size % 8) != 0 {
            return Err(Error::Corrupt("occupancy bits beyond table size"));
        }

        let store_keys = flags & FLAG_STORE_KEYS != 0;
        let keys = if store_keys {
            Some(sections.take_entries(data, size, occupied_bits)?)
        } else {
            None
        };
        let values = sections.take_entries(data, size, occupied_bits)?;

        if sections.position != data.len() {
            return Err(Error::Corrupt("trailing bytes"));
        }

        let mode = if flags & FLAG_UVARINT != 0 {
            ValueMode::UInt64
        } else {
            ValueMode::Bytes
        };

        let layout = Self {
            store_keys,
            mode,
            size,
            bucket_count,
            seed_count,
            len,
            seeds: seeds.start,
            indices: indices.start,
            occupied,
            keys,
            values,
        };

        if mode == ValueMode::UInt64 {
            for slot in 0..size {
                if layout.occupied(data, slot) {
                    if decode_varint(layout.value(data, slot)).is_none() {
                        return Err(Error::Corrupt("malformed varint value"));
                    }
                }
            }
        }

        Ok(layout)
    }

    /// Seed `index` of `r`. `index` must be less than `seed_count`.
    pub fn seed(&self, data: &[u8], index: usize) -> u64 {
        LE::read_u64(&data[self.seeds + index * 8..])
    }

    /// Seed index of `bucket`, or `None` for an empty bucket. `bucket` must be less than
    /// `bucket_count`.
    pub fn index(&self, data: &[u8], bucket: usize) -> Option<u16> {
        let index = LE::read_u16(&data[self.indices + bucket * 2..]);
        (index != UNUSED_BUCKET).then_some(index)
    }

    /// Whether `slot` holds an entry. `slot` must be less than `size`.
    pub fn occupied(&self, data: &[u8], slot: usize) -> bool {
        bitmap::get_bit(&data[self.occupied.clone()], slot)
    }

    /// Key bytes stored at `slot`, if keys are stored.
    pub fn key<'d>(&self, data: &'d [u8], slot: usize) -> Option<&'d [u8]> {
        self.keys.map(|keys| &data[keys.range(data, slot)])
    }

    /// Raw value bytes stored at `slot`.
    pub fn value<'d>(&self, data: &'d [u8], slot: usize) -> &'d [u8] {
        &data[self.values.range(data, slot)]
    }
}

/// Encoding of freshly built tables.
#[cfg(feature = "build")]
pub mod encode {
    use super::{
        bitmap::BitMap, FLAG_STORE_KEYS, FLAG_UVARINT, HEADER_LEN, MAGIC, UNUSED_BUCKET, VERSION,
    };
    use crate::value::{PendingValue, ValueMode};
    use alloc::vec::Vec;
    use byteorder::{LittleEndian as LE, WriteBytesExt};
    use std::io::{self, Write};
    use varint_rs::VarintWriter;

    /// Everything a table consists of, before encoding.
    pub struct RawTable<'e> {
        /// Identifier of the string hash.
        pub hash_id: u8,
        /// Whether keys are stored.
        pub store_keys: bool,
        /// How values are stored.
        pub mode: ValueMode,
        /// The seed list `r`.
        pub seeds: &'e [u64],
        /// Seed index per bucket.
        pub indices: &'e [Option<u16>],
        /// Entry per slot.
        pub slots: &'e [Option<(&'e [u8], &'e PendingValue)>],
    }

    /// Write an offset array for `slots`, followed by the blob `write` fills for occupied slots.
    fn write_entries<T>(
        out: &mut Vec<u8>,
        slots: &[Option<T>],
        mut write: impl FnMut(&T, &mut Vec<u8>) -> io::Result<()>,
    ) -> io::Result<()> {
        let mut blob = Vec::new();
        out.write_u64::<LE>(0)?;
        for slot in slots {
            if let Some(entry) = slot {
                write(entry, &mut blob)?;
            }
            out.write_u64::<LE>(blob.len() as u64)?;
        }
        out.write_all(&blob)
    }

    impl RawTable<'_> {
        /// Serialize into a fresh buffer.
        pub fn encode(&self) -> io::Result<Vec<u8>> {
            let size = self.slots.len();
            let mut out = Vec::with_capacity(HEADER_LEN);

            let mut flags = 0;
            if self.store_keys {
                flags |= FLAG_STORE_KEYS;
            }
            if self.mode == ValueMode::UInt64 {
                flags |= FLAG_UVARINT;
            }
            out.write_all(&MAGIC)?;
            out.write_u8(VERSION)?;
            out.write_u8(self.hash_id)?;
            out.write_u8(flags)?;
            out.write_u8(0)?;
            out.write_u64::<LE>(size as u64)?;
            out.write_u64::<LE>(self.indices.len() as u64)?;
            out.write_u64::<LE>(self.seeds.len() as u64)?;

            for &seed in self.seeds {
                out.write_u64::<LE>(seed)?;
            }
            for index in self.indices {
                out.write_u16::<LE>(index.unwrap_or(UNUSED_BUCKET))?;
            }

            let mut occupied = BitMap::new_zeros(size);
            for (slot, entry) in self.slots.iter().enumerate() {
                if entry.is_some() {
                    occupied.set(slot);
                }
            }
            out.write_all(occupied.as_bytes())?;

            if self.store_keys {
                write_entries(&mut out, self.slots, |(key, _), blob| blob.write_all(key))?;
            }
            write_entries(&mut out, self.slots, |(_, value), blob| match value {
                PendingValue::Bytes(bytes) => blob.write_all(bytes),
                PendingValue::UInt64(x) => blob.write_u64_varint(*x),
            })?;
            Ok(out)
        }
    }
}
