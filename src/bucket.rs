//! Summary: Bucket handles for namespaced, nestable key-value storage.
//! Copyright (c) YOAB. All rights reserved.
//!
//! Buckets provide logical namespacing for keys within the database. Each
//! bucket has a key unique among its siblings and stores its own set of
//! key-value pairs isolated from other buckets. This design mirrors the
//! bucket model of bbolt/boltdb.
//!
//! # Design
//!
//! A [`Bucket`] is a lightweight handle: the owning transaction plus the id
//! of a record in the transaction's private state. Any number of handles may
//! be alive at once, and every one of them reads and writes the same private
//! snapshot.
//!
//! # Nested Buckets
//!
//! A nested bucket is a separate record whose parent id is the enclosing
//! bucket. The parent additionally stores an [`Entry::Bucket`] under the
//! child's key, so iterating the parent lists nested buckets (with an empty
//! value) in key order alongside plain values. Record and entry are always
//! created and removed together.

use tracing::debug;

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::state::{BucketId, BucketRecord, Entry};
use crate::tx::Transaction;

/// A handle to a bucket inside a transaction.
///
/// Obtained from [`Transaction::read_bucket`], [`Transaction::create_top_level_bucket`]
/// or from another bucket's nested-bucket methods.
///
/// If the bucket is deleted while a handle to it is still held, the handle
/// becomes stale: reads return nothing and writes fail with `BucketNotFound`.
#[derive(Debug, Clone, Copy)]
pub struct Bucket<'tx> {
    tx: &'tx Transaction,
    id: BucketId,
}

impl<'tx> Bucket<'tx> {
    pub(crate) fn new(tx: &'tx Transaction, id: BucketId) -> Self {
        Self { tx, id }
    }

    /// Returns the bucket id.
    #[inline]
    pub fn id(&self) -> BucketId {
        self.id
    }

    /// Returns the bucket key, or an empty key if the bucket was deleted.
    pub fn key(&self) -> Vec<u8> {
        self.with_record(|bkt| bkt.key().to_vec())
            .unwrap_or_default()
    }

    /// Returns the transaction this bucket belongs to.
    #[inline]
    pub fn tx(&self) -> &'tx Transaction {
        self.tx
    }

    /// Runs `f` against this bucket's record, if it still exists.
    fn with_record<R>(&self, f: impl FnOnce(&BucketRecord) -> R) -> Option<R> {
        let state = self.tx.state();
        state.bucket(self.id).map(f)
    }

    /// Runs `f` against this bucket's record mutably.
    fn with_record_mut<R>(&self, f: impl FnOnce(&mut BucketRecord) -> R) -> Result<R> {
        let mut state = self.tx.state_mut();
        state.bucket_mut(self.id).map(f).ok_or(Error::BucketNotFound)
    }

    /// Inserts or updates a key-value pair in the bucket.
    ///
    /// The value may be empty.
    ///
    /// # Errors
    ///
    /// Returns `KeyRequired` if `key` is empty and `IncompatibleValue` if
    /// `key` names a nested bucket.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.tx.trace_values() {
            debug!(
                bucket_id = self.id,
                key = %key.escape_ascii(),
                value = %value.escape_ascii(),
                "bucket put"
            );
        } else {
            debug!(bucket_id = self.id, key = %key.escape_ascii(), "bucket put");
        }

        if key.is_empty() {
            return Err(Error::KeyRequired);
        }

        self.with_record_mut(|bkt| {
            if bkt.entries.get(key).is_some_and(Entry::is_bucket) {
                return Err(Error::IncompatibleValue);
            }
            bkt.entries.insert(key.to_vec(), Entry::Value(value.to_vec()));
            Ok(())
        })?
    }

    /// Retrieves the value associated with the given key.
    ///
    /// Returns `None` if the key does not exist or names a nested bucket.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        debug!(bucket_id = self.id, key = %key.escape_ascii(), "bucket get");

        self.with_record(|bkt| match bkt.entries.get(key) {
            Some(Entry::Value(value)) => Some(value.clone()),
            _ => None,
        })
        .flatten()
    }

    /// Deletes a key from the bucket.
    ///
    /// Does nothing if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleValue` if `key` names a nested bucket; use
    /// [`Bucket::delete_nested_bucket`] for those.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        debug!(bucket_id = self.id, key = %key.escape_ascii(), "bucket delete");

        self.with_record_mut(|bkt| {
            match bkt.entries.get(key).map(Entry::is_bucket) {
                Some(true) => return Err(Error::IncompatibleValue),
                Some(false) => {
                    bkt.entries.remove(key);
                }
                None => {}
            }
            Ok(())
        })?
    }

    /// Calls `visit` for every entry in ascending key order.
    ///
    /// The entries are captured before the first call, so `visit` may modify
    /// this bucket without affecting the iteration. Nested buckets are
    /// visited with an empty value.
    ///
    /// Stops at and returns the first error produced by `visit`.
    pub fn for_each<F, E>(&self, mut visit: F) -> std::result::Result<(), E>
    where
        F: FnMut(&[u8], &[u8]) -> std::result::Result<(), E>,
    {
        debug!(bucket_id = self.id, "bucket for each");

        let entries: Vec<(Vec<u8>, Vec<u8>)> = self
            .with_record(|bkt| {
                bkt.entries
                    .iter()
                    .map(|(k, entry)| (k.clone(), entry.value().to_vec()))
                    .collect()
            })
            .unwrap_or_default();

        for (key, value) in &entries {
            visit(key.as_slice(), value.as_slice())?;
        }
        Ok(())
    }

    /// Returns the nested bucket stored under `key`.
    ///
    /// Returns `None` if there is no such nested bucket.
    pub fn nested_read_bucket(&self, key: &[u8]) -> Option<Bucket<'tx>> {
        self.nested_read_write_bucket(key)
    }

    /// Returns the nested bucket stored under `key` for reading and writing.
    ///
    /// Returns `None` if there is no such nested bucket.
    pub fn nested_read_write_bucket(&self, key: &[u8]) -> Option<Bucket<'tx>> {
        debug!(parent_id = self.id, key = %key.escape_ascii(), "nested bucket lookup");

        let state = self.tx.state();
        let index = state.find(self.id, key)?;
        Some(Bucket::new(self.tx, state.record(index).id()))
    }

    /// Creates a nested bucket under `key`.
    ///
    /// A plain value previously stored under `key` is replaced by the bucket.
    ///
    /// # Errors
    ///
    /// Returns `BucketNameRequired` if `key` is empty, `BucketExists` if a
    /// nested bucket with the same key exists and `BucketNotFound` if this
    /// bucket was deleted.
    pub fn create_bucket(&self, key: &[u8]) -> Result<Bucket<'tx>> {
        debug!(parent_id = self.id, key = %key.escape_ascii(), "create bucket");

        if key.is_empty() {
            return Err(Error::BucketNameRequired);
        }

        let mut state = self.tx.state_mut();
        if state.bucket(self.id).is_none() {
            return Err(Error::BucketNotFound);
        }
        if state.find(self.id, key).is_some() {
            return Err(Error::BucketExists);
        }

        let child = state.add(BucketRecord::new(self.id, key));
        if let Some(parent) = state.bucket_mut(self.id) {
            parent.entries.insert(key.to_vec(), Entry::Bucket(child));
        }
        debug!(tx_id = self.tx.id(), bucket_id = child, parent_id = self.id, "allocated bucket");

        Ok(Bucket::new(self.tx, child))
    }

    /// Returns the nested bucket under `key`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `BucketNameRequired` if `key` is empty and `BucketNotFound` if
    /// this bucket was deleted.
    pub fn create_bucket_if_not_exists(&self, key: &[u8]) -> Result<Bucket<'tx>> {
        debug!(parent_id = self.id, key = %key.escape_ascii(), "create bucket if not exists");

        if let Some(existing) = self.nested_read_write_bucket(key) {
            return Ok(existing);
        }

        match self.create_bucket(key) {
            Err(Error::BucketExists) => self
                .nested_read_write_bucket(key)
                .ok_or(Error::BucketNotFound),
            other => other,
        }
    }

    /// Deletes the nested bucket under `key` together with its contents.
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleValue` if `key` is empty and `BucketNotFound` if
    /// there is no nested bucket under `key`.
    pub fn delete_nested_bucket(&self, key: &[u8]) -> Result<()> {
        debug!(parent_id = self.id, key = %key.escape_ascii(), "delete nested bucket");

        if key.is_empty() {
            return Err(Error::IncompatibleValue);
        }

        let mut state = self.tx.state_mut();
        let index = state.find(self.id, key).ok_or(Error::BucketNotFound)?;

        // Record and parent entry go together.
        let removed = state.remove_bucket(index);
        if let Some(parent) = state.bucket_mut(self.id) {
            parent.entries.remove(key);
        }
        debug!(parent_id = self.id, removed, "removed bucket records");

        Ok(())
    }

    /// Increments and returns the bucket's sequence number.
    ///
    /// # Errors
    ///
    /// Returns `BucketNotFound` if this bucket was deleted.
    pub fn next_sequence(&self) -> Result<u64> {
        self.with_record_mut(|bkt| {
            bkt.sequence = bkt.sequence.wrapping_add(1);
            bkt.sequence
        })
    }

    /// Overrides the bucket's sequence number.
    ///
    /// # Errors
    ///
    /// Returns `BucketNotFound` if this bucket was deleted.
    pub fn set_sequence(&self, value: u64) -> Result<()> {
        self.with_record_mut(|bkt| bkt.sequence = value)
    }

    /// Returns the bucket's current sequence number.
    pub fn sequence(&self) -> u64 {
        self.with_record(BucketRecord::sequence).unwrap_or(0)
    }

    /// Creates a cursor over the bucket's current keys.
    pub fn read_cursor(&self) -> Cursor<'tx> {
        debug!(bucket_id = self.id, "create read cursor");
        Cursor::new(*self)
    }

    /// Creates a cursor over the bucket's current keys that can delete entries.
    pub fn read_write_cursor(&self) -> Cursor<'tx> {
        debug!(bucket_id = self.id, "create read/write cursor");
        Cursor::new(*self)
    }

    /// Returns the sorted keys currently in the bucket.
    pub(crate) fn keys(&self) -> Vec<Vec<u8>> {
        self.with_record(|bkt| bkt.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the value a cursor reports for `key`.
    ///
    /// Nested buckets and keys removed since the cursor was built read as empty.
    pub(crate) fn cursor_value(&self, key: &[u8]) -> Vec<u8> {
        self.with_record(|bkt| {
            bkt.entries
                .get(key)
                .map(|entry| entry.value().to_vec())
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ROOT_BUCKET_ID, State};
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn tx() -> Transaction {
        Transaction::begin(Arc::new(RwLock::new(State::new())), false)
    }

    fn collect(bucket: &Bucket<'_>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut items = Vec::new();
        bucket
            .for_each(|k, v| {
                items.push((k.to_vec(), v.to_vec()));
                Ok::<(), Error>(())
            })
            .unwrap();
        items
    }

    #[test]
    fn test_put_get_delete() {
        let tx = tx();
        let bucket = tx.create_top_level_bucket(b"test").unwrap();

        bucket.put(b"key", b"value").unwrap();
        assert_eq!(bucket.get(b"key"), Some(b"value".to_vec()));
        assert_eq!(bucket.get(b"missing"), None);

        bucket.put(b"key", b"").unwrap();
        assert_eq!(bucket.get(b"key"), Some(Vec::new()));

        bucket.delete(b"key").unwrap();
        assert_eq!(bucket.get(b"key"), None);

        // Deleting a missing key is a no-op.
        bucket.delete(b"key").unwrap();
    }

    #[test]
    fn test_put_requires_key() {
        let tx = tx();
        let bucket = tx.create_top_level_bucket(b"test").unwrap();
        assert_eq!(bucket.put(b"", b"value"), Err(Error::KeyRequired));
    }

    #[test]
    fn test_handles_share_private_state() {
        let tx = tx();
        let first = tx.create_top_level_bucket(b"test").unwrap();
        let second = tx.read_bucket(b"test").unwrap();

        first.put(b"key", b"value").unwrap();
        assert_eq!(second.get(b"key"), Some(b"value".to_vec()));
        assert_eq!(first.key(), b"test".to_vec());
        assert!(std::ptr::eq(first.tx(), &tx));
    }

    #[test]
    fn test_bucket_isolation() {
        let tx = tx();
        let b1 = tx.create_top_level_bucket(b"bucket1").unwrap();
        let b2 = tx.create_top_level_bucket(b"bucket2").unwrap();

        b1.put(b"key", b"value1").unwrap();
        b2.put(b"key", b"value2").unwrap();

        assert_eq!(b1.get(b"key"), Some(b"value1".to_vec()));
        assert_eq!(b2.get(b"key"), Some(b"value2".to_vec()));
        assert_eq!(collect(&b1).len(), 1);
        assert_eq!(collect(&b2).len(), 1);
    }

    // ==================== Iteration Tests ====================

    #[test]
    fn test_for_each_sorted() {
        let tx = tx();
        let bucket = tx.create_top_level_bucket(b"alphabet").unwrap();
        for key in [b"c", b"b", b"a", b"3", b"2", b"1"] {
            bucket.put(key, key).unwrap();
        }

        let keys: Vec<Vec<u8>> = collect(&bucket).into_iter().map(|(k, _)| k).collect();
        let expected: Vec<Vec<u8>> = [b"1", b"2", b"3", b"a", b"b", b"c"]
            .iter()
            .map(|k| k.to_vec())
            .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_for_each_not_perturbed_by_mutation() {
        let tx = tx();
        let bucket = tx.create_top_level_bucket(b"test").unwrap();
        bucket.put(b"a", b"1").unwrap();
        bucket.put(b"b", b"2").unwrap();

        let mut seen = Vec::new();
        bucket
            .for_each(|k, v| {
                seen.push((k.to_vec(), v.to_vec()));
                bucket.delete(b"b")?;
                bucket.put(b"c", b"3")
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]
        );
        assert_eq!(bucket.get(b"b"), None);
        assert_eq!(bucket.get(b"c"), Some(b"3".to_vec()));
    }

    #[test]
    fn test_for_each_propagates_error() {
        let tx = tx();
        let bucket = tx.create_top_level_bucket(b"test").unwrap();
        for key in [b"a", b"b", b"c"] {
            bucket.put(key, b"").unwrap();
        }

        let mut visited = Vec::new();
        let result = bucket.for_each(|k, _| {
            visited.push(k.to_vec());
            if k == b"b" { Err("stop") } else { Ok(()) }
        });

        assert_eq!(result, Err("stop"));
        assert_eq!(visited, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    // ==================== Nested Bucket Tests ====================

    #[test]
    fn test_create_nested_bucket() {
        let tx = tx();
        let parent = tx.create_top_level_bucket(b"parent").unwrap();
        let child = parent.create_bucket(b"child").unwrap();

        let state = tx.state();
        let record = state.bucket(child.id()).unwrap();
        assert_eq!(record.parent(), parent.id());
        assert_eq!(record.sequence(), 0);
        assert!(record.is_empty());
        assert_eq!(
            state.bucket(parent.id()).unwrap().entries.get(&b"child"[..]),
            Some(&Entry::Bucket(child.id()))
        );
    }

    #[test]
    fn test_create_bucket_twice_fails() {
        let tx = tx();
        let parent = tx.create_top_level_bucket(b"parent").unwrap();
        let child = parent.create_bucket(b"child").unwrap();

        assert_eq!(parent.create_bucket(b"child").unwrap_err(), Error::BucketExists);
        let again = parent.create_bucket_if_not_exists(b"child").unwrap();
        assert_eq!(again.id(), child.id());
    }

    #[test]
    fn test_create_bucket_requires_name() {
        let tx = tx();
        let parent = tx.create_top_level_bucket(b"parent").unwrap();
        assert_eq!(parent.create_bucket(b"").unwrap_err(), Error::BucketNameRequired);
        assert_eq!(
            parent.create_bucket_if_not_exists(b"").unwrap_err(),
            Error::BucketNameRequired
        );
    }

    #[test]
    fn test_nested_bucket_enumerates_with_empty_value() {
        let tx = tx();
        let parent = tx.create_top_level_bucket(b"alphabet").unwrap();
        parent.put(b"b", b"plain").unwrap();
        parent.create_bucket(b"c").unwrap();
        parent.create_bucket(b"a").unwrap();

        assert_eq!(
            collect(&parent),
            vec![
                (b"a".to_vec(), Vec::new()),
                (b"b".to_vec(), b"plain".to_vec()),
                (b"c".to_vec(), Vec::new()),
            ]
        );
        assert_eq!(parent.get(b"a"), None);
    }

    #[test]
    fn test_nested_bucket_shadows_value() {
        let tx = tx();
        let parent = tx.create_top_level_bucket(b"parent").unwrap();
        parent.put(b"key", b"value").unwrap();

        parent.create_bucket(b"key").unwrap();
        assert_eq!(parent.get(b"key"), None);
        assert_eq!(collect(&parent), vec![(b"key".to_vec(), Vec::new())]);

        // The bucket entry cannot be clobbered through the value API.
        assert_eq!(parent.put(b"key", b"v"), Err(Error::IncompatibleValue));
        assert_eq!(parent.delete(b"key"), Err(Error::IncompatibleValue));
        assert!(parent.nested_read_bucket(b"key").is_some());
    }

    #[test]
    fn test_delete_nested_bucket() {
        let tx = tx();
        let parent = tx.create_top_level_bucket(b"parent").unwrap();
        let child = parent.create_bucket(b"child").unwrap();
        child.create_bucket(b"grandchild").unwrap();
        child.put(b"key", b"value").unwrap();

        parent.delete_nested_bucket(b"child").unwrap();

        assert!(parent.nested_read_bucket(b"child").is_none());
        assert!(collect(&parent).is_empty());
        assert_eq!(tx.state().buckets().len(), 1);

        assert_eq!(parent.delete_nested_bucket(b"child"), Err(Error::BucketNotFound));
        assert_eq!(parent.delete_nested_bucket(b""), Err(Error::IncompatibleValue));
    }

    #[test]
    fn test_stale_handle_after_delete() {
        let tx = tx();
        let parent = tx.create_top_level_bucket(b"parent").unwrap();
        let child = parent.create_bucket(b"child").unwrap();
        child.put(b"key", b"value").unwrap();

        parent.delete_nested_bucket(b"child").unwrap();

        assert_eq!(child.get(b"key"), None);
        assert_eq!(child.put(b"key", b"value"), Err(Error::BucketNotFound));
        assert_eq!(child.create_bucket(b"x").unwrap_err(), Error::BucketNotFound);
        assert_eq!(child.next_sequence(), Err(Error::BucketNotFound));
        assert!(child.key().is_empty());
        assert!(collect(&child).is_empty());
    }

    #[test]
    fn test_nested_lookup_is_scoped_to_parent() {
        let tx = tx();
        let p1 = tx.create_top_level_bucket(b"p1").unwrap();
        let p2 = tx.create_top_level_bucket(b"p2").unwrap();
        p1.create_bucket(b"child").unwrap();

        assert!(p1.nested_read_write_bucket(b"child").is_some());
        assert!(p2.nested_read_write_bucket(b"child").is_none());
        assert!(p1.nested_read_write_bucket(b"chil").is_none());
        // Top-level buckets are never found as nested buckets.
        assert!(p1.nested_read_bucket(b"p2").is_none());
        assert_eq!(tx.state().find(ROOT_BUCKET_ID, b"p1"), None);
    }

    #[test]
    fn test_deep_nested_bucket() {
        let tx = tx();
        let root = tx.create_top_level_bucket(b"root").unwrap();
        let level1 = root.create_bucket(b"level1").unwrap();
        let level2 = level1.create_bucket(b"level2").unwrap();
        level2.put(b"deep_key", b"deep_value").unwrap();

        let found = tx
            .read_bucket(b"root")
            .and_then(|b| b.nested_read_bucket(b"level1"))
            .and_then(|b| b.nested_read_bucket(b"level2"))
            .unwrap();
        assert_eq!(found.get(b"deep_key"), Some(b"deep_value".to_vec()));
    }

    // ==================== Sequence Tests ====================

    #[test]
    fn test_sequence_per_bucket() {
        let tx = tx();
        let a = tx.create_top_level_bucket(b"a").unwrap();
        let b = tx.create_top_level_bucket(b"b").unwrap();

        assert_eq!(a.sequence(), 0);
        assert_eq!(a.next_sequence(), Ok(1));
        assert_eq!(a.next_sequence(), Ok(2));
        assert_eq!(b.sequence(), 0);

        b.set_sequence(100).unwrap();
        assert_eq!(b.next_sequence(), Ok(101));
        assert_eq!(a.next_sequence(), Ok(3));
        assert_eq!(a.sequence(), 3);
    }
}
