//! Duplicate index over a full file set.
//!
//! The index is rebuilt from scratch for every key change. A file's group is
//! the bucket for its own key value, so it always contains the file itself.
//! Under the hash-based keys a file without a digest shares a bucket with
//! nobody.

use std::collections::HashMap;

use super::settings::EquivalenceKey;
use crate::scanner::{FileRecord, Hash};

#[derive(Debug, PartialEq, Eq, Hash)]
enum BucketKey<'a> {
    Name(&'a str),
    Content(Hash),
    NameAndContent(&'a str, Hash),
    Alone(usize),
}

fn bucket_key(key: EquivalenceKey, position: usize, record: &FileRecord) -> BucketKey<'_> {
    match (key, record.content_hash) {
        (EquivalenceKey::ByName, _) => BucketKey::Name(&record.name),
        (EquivalenceKey::ByHash, Some(hash)) => BucketKey::Content(hash),
        (EquivalenceKey::ByNameAndHash, Some(hash)) => {
            BucketKey::NameAndContent(&record.name, hash)
        }
        (_, None) => BucketKey::Alone(position),
    }
}

/// Files partitioned by an [`EquivalenceKey`].
///
/// Positions refer to the slice the index was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateIndex {
    key: EquivalenceKey,
    buckets: Vec<Vec<usize>>,
    bucket_of: Vec<usize>,
}

impl DuplicateIndex {
    /// Partition `files` by `key`.
    ///
    /// Buckets are numbered in order of first appearance and list their
    /// members in input order.
    #[must_use]
    pub fn build(files: &[FileRecord], key: EquivalenceKey) -> Self {
        let mut lookup: HashMap<BucketKey<'_>, usize> = HashMap::with_capacity(files.len());
        let mut buckets: Vec<Vec<usize>> = Vec::new();
        let mut bucket_of = Vec::with_capacity(files.len());

        for (position, record) in files.iter().enumerate() {
            let bucket = *lookup
                .entry(bucket_key(key, position, record))
                .or_insert_with(|| {
                    buckets.push(Vec::new());
                    buckets.len() - 1
                });
            buckets[bucket].push(position);
            bucket_of.push(bucket);
        }

        log::debug!(
            "Indexed {} files by {} into {} groups",
            files.len(),
            key,
            buckets.len()
        );

        Self {
            key,
            buckets,
            bucket_of,
        }
    }

    /// The key this index was built with.
    #[must_use]
    pub fn key(&self) -> EquivalenceKey {
        self.key
    }

    /// Number of indexed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bucket_of.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bucket_of.is_empty()
    }

    /// Positions of every file equivalent to the file at `position`,
    /// including itself. Empty if `position` is out of range.
    #[must_use]
    pub fn group_of(&self, position: usize) -> &[usize] {
        self.bucket_of
            .get(position)
            .map_or(&[][..], |&bucket| self.buckets[bucket].as_slice())
    }

    /// Whether the file at `position` has at least one equivalent.
    #[must_use]
    pub fn has_duplicates(&self, position: usize) -> bool {
        self.group_of(position).len() > 1
    }

    /// Groups with more than one member.
    pub fn duplicate_groups(&self) -> impl Iterator<Item = &[usize]> {
        self.buckets
            .iter()
            .filter(|bucket| bucket.len() > 1)
            .map(Vec::as_slice)
    }
}
