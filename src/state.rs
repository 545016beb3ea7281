//! Summary: Bucket records and the snapshot-able database state.
//! Copyright (c) YOAB. All rights reserved.
//!
//! The whole database is a flat list of bucket records. Nesting is expressed
//! only through each record's `parent` id; there is no recursive structure.
//! Children are located by a linear scan over `(parent, key)`.
//!
//! # Entries
//!
//! Each record owns a sorted map of its entries. An entry is either a plain
//! value or a reference to a nested bucket. The nested-bucket entry lives
//! under the child's key in the parent's map so enumeration of the parent
//! sees the child alongside plain values.

use std::collections::BTreeMap;

/// Identifier of a bucket record.
pub type BucketId = u64;

/// Sentinel parent id of top-level buckets.
pub const ROOT_BUCKET_ID: BucketId = 0;

/// A single entry in a bucket's key space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A plain value (possibly empty).
    Value(Vec<u8>),
    /// A nested bucket stored under this key.
    Bucket(BucketId),
}

impl Entry {
    /// Returns the value bytes as seen by enumeration.
    ///
    /// Nested buckets enumerate with an empty value.
    #[inline]
    pub fn value(&self) -> &[u8] {
        match self {
            Entry::Value(v) => v,
            Entry::Bucket(_) => &[],
        }
    }

    /// Returns true if this entry refers to a nested bucket.
    #[inline]
    pub fn is_bucket(&self) -> bool {
        matches!(self, Entry::Bucket(_))
    }
}

/// A bucket record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRecord {
    pub(crate) id: BucketId,
    pub(crate) parent: BucketId,
    pub(crate) key: Vec<u8>,
    pub(crate) entries: BTreeMap<Vec<u8>, Entry>,
    pub(crate) sequence: u64,
}

impl BucketRecord {
    /// Creates an empty, unregistered record. The id is assigned by [`State::add`].
    pub(crate) fn new(parent: BucketId, key: &[u8]) -> Self {
        Self {
            id: ROOT_BUCKET_ID,
            parent,
            key: key.to_vec(),
            entries: BTreeMap::new(),
            sequence: 0,
        }
    }

    /// Returns the bucket id.
    #[inline]
    pub fn id(&self) -> BucketId {
        self.id
    }

    /// Returns the parent bucket id (`ROOT_BUCKET_ID` for top-level buckets).
    #[inline]
    pub fn parent(&self) -> BucketId {
        self.parent
    }

    /// Returns the bucket key.
    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Returns the current sequence value.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the number of entries, nested buckets included.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the bucket holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if this is a top-level bucket.
    #[inline]
    pub fn is_top_level(&self) -> bool {
        self.parent == ROOT_BUCKET_ID
    }
}

/// The complete database state.
///
/// A transaction works on its own deep copy of a `State`; commit replaces the
/// live state wholesale with a copy of the transaction's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    buckets: Vec<BucketRecord>,
    next_bucket_id: BucketId,
    next_tx_id: u64,
}

impl State {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record, assigning it the next bucket id.
    pub(crate) fn add(&mut self, mut record: BucketRecord) -> BucketId {
        self.next_bucket_id += 1;
        record.id = self.next_bucket_id;
        self.buckets.push(record);
        self.next_bucket_id
    }

    /// Returns a deep copy of the state.
    ///
    /// Every record and every entry map is duplicated; the copy shares no
    /// storage with `self`.
    pub fn snapshot(&self) -> State {
        State {
            buckets: self
                .buckets
                .iter()
                .map(|bkt| BucketRecord {
                    id: bkt.id,
                    parent: bkt.parent,
                    key: bkt.key.clone(),
                    entries: bkt
                        .entries
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                    sequence: bkt.sequence,
                })
                .collect(),
            next_bucket_id: self.next_bucket_id,
            next_tx_id: self.next_tx_id,
        }
    }

    /// Returns all bucket records in insertion order.
    #[inline]
    pub fn buckets(&self) -> &[BucketRecord] {
        &self.buckets
    }

    /// Returns the id that was most recently allocated to a bucket.
    #[inline]
    pub fn next_bucket_id(&self) -> BucketId {
        self.next_bucket_id
    }

    /// Returns the id that was most recently allocated to a transaction.
    #[inline]
    pub fn next_tx_id(&self) -> u64 {
        self.next_tx_id
    }

    /// Allocates the next transaction id.
    pub(crate) fn allocate_tx_id(&mut self) -> u64 {
        self.next_tx_id += 1;
        self.next_tx_id
    }

    /// Raises both counters to at least the given values.
    pub(crate) fn advance_counters(&mut self, next_bucket_id: BucketId, next_tx_id: u64) {
        self.next_bucket_id = self.next_bucket_id.max(next_bucket_id);
        self.next_tx_id = self.next_tx_id.max(next_tx_id);
    }

    /// Looks up a record by id.
    pub fn bucket(&self, id: BucketId) -> Option<&BucketRecord> {
        self.buckets.iter().find(|bkt| bkt.id == id)
    }

    pub(crate) fn bucket_mut(&mut self, id: BucketId) -> Option<&mut BucketRecord> {
        self.buckets.iter_mut().find(|bkt| bkt.id == id)
    }

    /// Finds the index of the nested bucket `key` under `parent`.
    ///
    /// Root-parented records are never matched; use [`State::find_top_level`]
    /// for those.
    pub fn find(&self, parent: BucketId, key: &[u8]) -> Option<usize> {
        self.buckets.iter().position(|bkt| {
            bkt.parent != ROOT_BUCKET_ID && bkt.parent == parent && bkt.key == key
        })
    }

    /// Finds the index of the first top-level bucket named `key`.
    pub fn find_top_level(&self, key: &[u8]) -> Option<usize> {
        self.buckets
            .iter()
            .position(|bkt| bkt.parent == ROOT_BUCKET_ID && bkt.key == key)
    }

    /// Returns the record at `index`.
    #[inline]
    pub(crate) fn record(&self, index: usize) -> &BucketRecord {
        &self.buckets[index]
    }

    /// Removes the record at `index` along with all of its descendants.
    ///
    /// Returns the number of records removed.
    pub(crate) fn remove_bucket(&mut self, index: usize) -> usize {
        let root = self.buckets.remove(index);
        let mut doomed = vec![root.id];
        let mut removed = 1;

        while let Some(parent) = doomed.pop() {
            let before = self.buckets.len();
            self.buckets.retain(|bkt| {
                if bkt.parent == parent {
                    doomed.push(bkt.id);
                    false
                } else {
                    true
                }
            });
            removed += before - self.buckets.len();
        }

        removed
    }
}
