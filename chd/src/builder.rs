//! Table construction.

use super::{
    bitmap::BitMap,
    bucket::{self, Bucket},
    format::{encode::RawTable, MAX_BUCKETS},
    hash::{default_seed_source, Hasher, RapidStringHash, SeedSource, StringHash},
    value::{PendingValue, ValueMode},
    Error, Result, Table,
};
use alloc::{collections::BTreeSet, vec, vec::Vec};
use core::marker::PhantomData;
use rapidhash::RapidRng;

/// How many fresh seeds are tried for a single bucket before giving up.
const MAX_ATTEMPTS: u64 = 10_000_000;

/// Collects entries and builds a [`Table`].
///
/// Every builder holds values of one [`ValueMode`]. Entries are only validated by
/// [`build`](Self::build), which consumes the builder.
///
/// ```rust
/// # fn main() -> chd::Result<()> {
/// use chd::{Builder, ValueMode};
///
/// let mut builder = Builder::new(ValueMode::UInt64, 3);
/// builder.add_uvarint64("alpha", 1);
/// builder.add_uvarint64("beta", 2);
/// builder.add_uvarint64("gamma", 3);
/// let table = builder.build()?;
/// assert_eq!(table.get_u64(b"beta"), Some(2));
/// # Ok(())
/// # }
/// ```
pub struct Builder<S = RapidStringHash, R = RapidRng> {
    /// Entries in insertion order.
    entries: Vec<(Vec<u8>, PendingValue)>,

    /// The kind of values this builder accepts.
    mode: ValueMode,

    /// Whether the table stores keys.
    store_keys: bool,

    /// Random source for the outer seed and displacement seeds.
    source: R,

    /// Mark [`Builder`] as producing tables hashed with `S`.
    _marker: PhantomData<fn() -> S>,
}

impl Builder {
    /// Create a builder with the default string hash and a fixed seed source.
    ///
    /// Building the same entries in the same order always produces the same table. `size_hint` is
    /// the expected number of entries and is only used to pre-allocate.
    #[inline]
    #[must_use]
    pub fn new(mode: ValueMode, size_hint: usize) -> Self {
        Self::with_seed_source(mode, size_hint, default_seed_source())
    }
}

impl<S: StringHash, R: SeedSource> Builder<S, R> {
    /// Create a builder drawing seeds from `source`.
    #[inline]
    pub fn with_seed_source(mode: ValueMode, size_hint: usize, source: R) -> Self {
        Self {
            entries: Vec::with_capacity(size_hint),
            mode,
            store_keys: true,
            source,
            _marker: PhantomData,
        }
    }

    /// Choose whether keys are stored in the table. Enabled by default.
    ///
    /// Without keys the table is smaller, but looking up a key that was never added may return
    /// the value of another key instead of `None`.
    #[inline]
    pub fn store_keys(&mut self, store_keys: bool) -> &mut Self {
        self.store_keys = store_keys;
        self
    }

    /// Add an entry with a byte value.
    ///
    /// The builder must have been created with [`ValueMode::Bytes`]; otherwise
    /// [`build`](Self::build) fails.
    #[inline]
    pub fn add(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.entries
            .push((key.into(), PendingValue::Bytes(value.into())));
    }

    /// Add an entry with an integer value.
    ///
    /// The builder must have been created with [`ValueMode::UInt64`]; otherwise
    /// [`build`](Self::build) fails.
    #[inline]
    pub fn add_uvarint64(&mut self, key: impl Into<Vec<u8>>, value: u64) {
        self.entries.push((key.into(), PendingValue::UInt64(value)));
    }

    /// Get the number of entries added so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entries were added.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the table.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    ///
    /// - [`Error::DuplicateKey`] if a key was added twice.
    /// - [`Error::ValueModeMismatch`] if an entry was added with the wrong kind of value.
    /// - [`Error::CapacityOverflow`] if there are more than 65536 entries, or if construction needs
    ///   more than 65535 seeds.
    /// - [`Error::DisplacementExhausted`] if some bucket cannot be placed. This is not retried;
    ///   building again with a different seed source may succeed.
    #[expect(
        clippy::missing_inline_in_public_items,
        reason = "very heavy, we'd rather not copy it to every crate"
    )]
    pub fn build(self) -> Result<Table<'static, S>> {
        let Self {
            entries,
            mode,
            store_keys,
            source,
            _marker,
        } = self;

        let mut seen = BTreeSet::new();
        if let Some((key, _)) = entries.iter().find(|(key, _)| !seen.insert(key.as_slice())) {
            return Err(Error::DuplicateKey { key: key.clone() });
        }

        if let Some((key, _)) = entries.iter().find(|(_, value)| value.mode() != mode) {
            return Err(Error::ValueModeMismatch {
                key: key.clone(),
                expected: mode,
            });
        }

        let bucket_count = entries.len().max(1);
        if bucket_count > MAX_BUCKETS {
            return Err(Error::CapacityOverflow {
                what: "bucket",
                count: bucket_count,
                limit: MAX_BUCKETS,
            });
        }
        #[allow(clippy::arithmetic_side_effects, reason = "bucket_count <= 2^16")]
        let size = 1 + 2 * bucket_count;
        log::debug!(
            "building table: {} entries, {bucket_count} buckets, {size} slots",
            entries.len()
        );

        let mut hasher = Hasher::new(source, bucket_count as u64, size as u64);
        log::trace!("outer seed: {:#018x}", hasher.outer_seed());
        let hashes: Vec<u64> = entries.iter().map(|(key, _)| S::hash(key)).collect();
        let mut buckets = bucket::split(hashes.iter().copied(), &hasher, bucket_count);
        bucket::sort_for_displacement(&mut buckets);

        let mut displacement = Displacement {
            claimed: BitMap::new_zeros(size),
            slots: vec![None; size],
            indices: vec![None; bucket_count],
            scratch: Vec::new(),
        };
        for bucket in &buckets {
            if !displacement.place(bucket, &mut hasher)? {
                log::warn!(
                    "no seed found for bucket {} of size {}",
                    bucket.index,
                    bucket.members.len()
                );
                return Err(Error::DisplacementExhausted {
                    bucket: bucket.index,
                    size: bucket.members.len(),
                    keys: bucket
                        .members
                        .iter()
                        .map(|member| entries[member.entry].0.clone())
                        .collect(),
                });
            }
        }
        let Displacement { slots, indices, .. } = displacement;

        let seeds = hasher.into_seeds();
        log::debug!(
            "placed {} entries using {} seeds",
            entries.len(),
            seeds.len()
        );

        let slots: Vec<Option<(&[u8], &PendingValue)>> = slots
            .into_iter()
            .map(|slot| {
                slot.map(|entry| {
                    let (key, value) = &entries[entry];
                    (key.as_slice(), value)
                })
            })
            .collect();
        let encoded = RawTable {
            hash_id: S::ID,
            store_keys,
            mode,
            seeds: &seeds,
            indices: &indices,
            slots: &slots,
        }
        .encode()?;
        Table::from_encoded(encoded)
    }
}

/// State of phase two: which slots are taken and which seed each bucket uses.
struct Displacement {
    /// Slots claimed by already placed buckets.
    claimed: BitMap,

    /// Entry index per slot.
    slots: Vec<Option<usize>>,

    /// Seed index per bucket.
    indices: Vec<Option<u16>>,

    /// Candidate slots of the bucket being placed.
    scratch: Vec<usize>,
}

impl Displacement {
    /// Check whether `seed` sends every member of `bucket` to a distinct, unclaimed slot.
    ///
    /// On success, the slots are left in `scratch`, in member order.
    fn try_seed<R: SeedSource>(&mut self, bucket: &Bucket, hasher: &Hasher<R>, seed: u64) -> bool {
        self.scratch.clear();
        for member in &bucket.members {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "inner hash < size <= usize::MAX"
            )]
            let slot = hasher.inner_hash(seed, member.hash) as usize;
            // Buckets are small, a linear scan is enough
            if self.claimed.get(slot) || self.scratch.contains(&slot) {
                return false;
            }
            self.scratch.push(slot);
        }
        true
    }

    /// Find a seed for `bucket`, reusing committed seeds where possible, and claim its slots.
    ///
    /// Returns `false` if no seed works.
    fn place<R: SeedSource>(&mut self, bucket: &Bucket, hasher: &mut Hasher<R>) -> Result<bool> {
        if bucket.members.is_empty() {
            return Ok(true);
        }

        let mut found = None;
        for (index, &seed) in hasher.seeds().iter().enumerate() {
            if self.try_seed(bucket, hasher, seed) {
                found = u16::try_from(index).ok();
                break;
            }
        }

        // Keys with equal hashes collide under every seed, so don't bother searching
        let separable = bucket
            .members
            .iter()
            .enumerate()
            .all(|(i, a)| bucket.members[..i].iter().all(|b| a.hash != b.hash));

        if found.is_none() && separable {
            for _ in 0..MAX_ATTEMPTS {
                let (seed, _) = hasher.next_candidate_seed();
                if self.try_seed(bucket, hasher, seed) {
                    found = Some(hasher.commit(seed)?);
                    break;
                }
            }
        }

        let Some(index) = found else {
            return Ok(false);
        };

        for (member, &slot) in bucket.members.iter().zip(&self.scratch) {
            self.claimed.set(slot);
            self.slots[slot] = Some(member.entry);
        }
        self.indices[bucket.index] = Some(index);
        Ok(true)
    }
}
