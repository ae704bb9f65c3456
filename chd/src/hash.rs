//! String hashing and seeds.
//!
//! A table hashes every key once with a seedless 64-bit [`StringHash`] and then derives both the
//! bucket and the slot from that value by mixing in seeds:
//!
//! - the outer hash `(h ^ r[0]) % m` selects a bucket,
//! - the inner hash `(h ^ r[0] ^ r[i]) % n` selects a slot, where `i` is the seed index chosen for
//!   the bucket during construction.
//!
//! The string hash is recorded in the serialized table by its [`StringHash::ID`], so a table cannot
//! be loaded with a different hash than the one it was built with.

use core::hash::Hasher as _;
use rapidhash::{RapidHasher, RapidRng};
#[cfg(feature = "build")]
use super::format::MAX_SEEDS;

/// A 64-bit hash function over byte strings.
///
/// The hash must be deterministic and portable between platforms, as tables are built on one
/// machine and queried on another. It should also be close to uniform: keys with equal hashes
/// can never be separated by any seed, so such a pair fails construction.
pub trait StringHash {
    /// Identifier stored in the table header.
    ///
    /// Must be unique among the hashes a program loads tables with, and must never change once
    /// tables built with this hash have been persisted.
    const ID: u8;

    /// Hash a key.
    fn hash(key: &[u8]) -> u64;
}

/// The default [`StringHash`]: rapidhash with a fixed seed.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct RapidStringHash;

impl RapidStringHash {
    /// Seed fed to rapidhash. Part of the format.
    const SEED: u64 = 0x9e37_79b9_7f4a_7c15;
}

impl StringHash for RapidStringHash {
    const ID: u8 = 1;

    #[inline]
    fn hash(key: &[u8]) -> u64 {
        let mut state = RapidHasher::new(Self::SEED);
        state.write(key);
        state.finish()
    }
}

/// A source of random 64-bit seeds for table construction.
///
/// The builder draws the outer seed and every candidate displacement seed from this source. A
/// deterministic source makes builds reproducible.
pub trait SeedSource {
    /// Produce the next seed.
    fn next_seed(&mut self) -> u64;
}

impl SeedSource for RapidRng {
    #[inline]
    fn next_seed(&mut self) -> u64 {
        self.next()
    }
}

impl<S: SeedSource + ?Sized> SeedSource for &mut S {
    #[inline]
    fn next_seed(&mut self) -> u64 {
        (**self).next_seed()
    }
}

/// The seed source used by [`Builder::new`](crate::Builder::new).
#[inline]
#[must_use]
pub fn default_seed_source() -> RapidRng {
    // Hexadecimal digits of pi - 3
    RapidRng::new(0x243f_6a88_85a3_08d3)
}

/// Map a key hash to a bucket.
///
/// `bucket_count` must be non-zero.
#[inline]
pub(crate) const fn outer_index(hash: u64, outer_seed: u64, bucket_count: u64) -> u64 {
    #[allow(clippy::arithmetic_side_effects, reason = "bucket_count is non-zero")]
    {
        (hash ^ outer_seed) % bucket_count
    }
}

/// Map a key hash to a slot under the given displacement seed.
///
/// `size` must be non-zero.
#[inline]
pub(crate) const fn inner_index(hash: u64, outer_seed: u64, seed: u64, size: u64) -> u64 {
    #[allow(clippy::arithmetic_side_effects, reason = "size is non-zero")]
    {
        (hash ^ outer_seed ^ seed) % size
    }
}

/// Seed list under construction, together with the table geometry it hashes into.
#[cfg(feature = "build")]
pub(crate) struct Hasher<R> {
    /// Committed seeds. `seeds[0]` is the outer seed.
    seeds: alloc::vec::Vec<u64>,

    /// Where candidate seeds come from.
    source: R,

    /// Number of buckets, `m`.
    bucket_count: u64,

    /// Number of slots, `n`.
    size: u64,
}

#[cfg(feature = "build")]
impl<R: SeedSource> Hasher<R> {
    /// Draw the outer seed and set up a hasher for the given geometry.
    ///
    /// Both `bucket_count` and `size` must be non-zero.
    pub(crate) fn new(mut source: R, bucket_count: u64, size: u64) -> Self {
        let outer_seed = source.next_seed();
        Self {
            seeds: alloc::vec![outer_seed],
            source,
            bucket_count,
            size,
        }
    }

    /// The outer seed, `r[0]`.
    pub(crate) fn outer_seed(&self) -> u64 {
        self.seeds[0]
    }

    /// Bucket of a key hash.
    pub(crate) fn outer_hash(&self, hash: u64) -> u64 {
        outer_index(hash, self.outer_seed(), self.bucket_count)
    }

    /// Slot of a key hash under a candidate seed.
    pub(crate) fn inner_hash(&self, seed: u64, hash: u64) -> u64 {
        inner_index(hash, self.outer_seed(), seed, self.size)
    }

    /// Committed seeds, in commit order.
    pub(crate) fn seeds(&self) -> &[u64] {
        &self.seeds
    }

    /// Draw a fresh candidate seed.
    ///
    /// Returns the seed and the index it would get in the seed list if committed.
    pub(crate) fn next_candidate_seed(&mut self) -> (u64, usize) {
        (self.source.next_seed(), self.seeds.len())
    }

    /// Append an accepted seed to the seed list, returning its index.
    ///
    /// Fails once the list holds [`MAX_SEEDS`] seeds.
    pub(crate) fn commit(&mut self, seed: u64) -> crate::Result<u16> {
        let index = match u16::try_from(self.seeds.len()) {
            Ok(index) if usize::from(index) < MAX_SEEDS => index,
            _ => {
                return Err(crate::Error::CapacityOverflow {
                    what: "seed",
                    count: self.seeds.len().saturating_add(1),
                    limit: MAX_SEEDS,
                })
            }
        };
        self.seeds.push(seed);
        log::trace!("committed seed #{index}: {seed:#018x}");
        Ok(index)
    }

    /// Give up the seed list.
    pub(crate) fn into_seeds(self) -> alloc::vec::Vec<u64> {
        self.seeds
    }
}
