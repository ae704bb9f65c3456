//! Grouping keys into buckets by their outer hash.

use super::hash::{Hasher, SeedSource};
use alloc::{vec, vec::Vec};

/// A key queued for placement: its string hash and its position among the builder entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Member {
    /// Seedless string hash of the key.
    pub hash: u64,
    /// Index of the entry in the builder.
    pub entry: usize,
}

/// Keys sharing an outer hash value. Only exists while a table is being built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// The outer hash value shared by all members.
    pub index: usize,
    /// Members, in the order they were added to the builder.
    pub members: Vec<Member>,
}

/// Split key hashes into `bucket_count` buckets by their outer hash.
///
/// Returns all buckets, including empty ones, indexed by outer hash.
pub fn split<R: SeedSource>(
    hashes: impl IntoIterator<Item = u64>,
    hasher: &Hasher<R>,
    bucket_count: usize,
) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = (0..bucket_count)
        .map(|index| Bucket {
            index,
            members: vec![],
        })
        .collect();
    for (entry, hash) in hashes.into_iter().enumerate() {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "outer hash < bucket_count <= usize::MAX"
        )]
        let index = hasher.outer_hash(hash) as usize;
        buckets[index].members.push(Member { hash, entry });
    }
    buckets
}

/// Order buckets for displacement: largest first, ties broken by bucket index.
///
/// Resolving large buckets while few slots are claimed makes finding a seed for them cheap.
pub fn sort_for_displacement(buckets: &mut [Bucket]) {
    // Radix sort is stable, and `split` produces buckets in index order, so equal sizes keep
    // ascending bucket indices. Inverting the size sorts in decreasing order.
    radsort::sort_by_key(buckets, |bucket| !(bucket.members.len() as u64));
}
