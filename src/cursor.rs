//! Summary: Sorted, repositionable cursor over a bucket's keys.
//! Copyright (c) YOAB. All rights reserved.
//!
//! The cursor captures the bucket's keys in byte-lexicographic order when it
//! is created. Later puts and deletes on the bucket do not change the key
//! sequence; values are read from the bucket when the cursor lands on a key.

use tracing::debug;

use crate::bucket::Bucket;
use crate::error::{Error, Result};

/// A key/value pair returned by cursor movement.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// A cursor over a snapshot of a bucket's keys.
///
/// Positioning methods return `None` once the cursor moves outside the key
/// sequence. A key deleted from the bucket after the cursor was created is
/// still visited, with an empty value.
#[derive(Debug)]
pub struct Cursor<'tx> {
    bucket: Bucket<'tx>,
    keys: Vec<Vec<u8>>,
    /// May sit one step outside the sequence in either direction.
    index: isize,
}

impl<'tx> Cursor<'tx> {
    pub(crate) fn new(bucket: Bucket<'tx>) -> Self {
        Self {
            keys: bucket.keys(),
            bucket,
            index: 0,
        }
    }

    /// Returns the bucket this cursor iterates.
    #[inline]
    pub fn bucket(&self) -> Bucket<'tx> {
        self.bucket
    }

    /// Returns the number of keys captured by the cursor.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the bucket was empty when the cursor was created.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn get(&self, index: isize) -> Option<KeyValue> {
        let key = self.keys.get(usize::try_from(index).ok()?)?;
        Some((key.clone(), self.bucket.cursor_value(key)))
    }

    /// Moves to the first key.
    pub fn first(&mut self) -> Option<KeyValue> {
        debug!(bucket_id = self.bucket.id(), "cursor first");
        self.index = 0;
        self.get(self.index)
    }

    /// Moves to the last key.
    pub fn last(&mut self) -> Option<KeyValue> {
        debug!(bucket_id = self.bucket.id(), "cursor last");
        self.index = self.keys.len() as isize - 1;
        self.get(self.index)
    }

    /// Moves to the next key.
    pub fn next(&mut self) -> Option<KeyValue> {
        if self.index < self.keys.len() as isize {
            self.index += 1;
        }
        self.get(self.index)
    }

    /// Moves to the previous key.
    pub fn prev(&mut self) -> Option<KeyValue> {
        if self.index >= 0 {
            self.index -= 1;
        }
        self.get(self.index)
    }

    /// Moves to the first key that is greater than or equal to `target`.
    ///
    /// The search always covers the whole key sequence, regardless of the
    /// current position. Returns `None` if every key is less than `target`.
    pub fn seek(&mut self, target: &[u8]) -> Option<KeyValue> {
        debug!(bucket_id = self.bucket.id(), target = %target.escape_ascii(), "cursor seek");
        self.index = self.keys.partition_point(|k| k.as_slice() < target) as isize;
        self.get(self.index)
    }

    /// Deletes the key under the cursor from the bucket.
    ///
    /// The cursor's key sequence is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if the cursor is not on a key, or any error
    /// from [`Bucket::delete`].
    pub fn delete(&mut self) -> Result<()> {
        let key = usize::try_from(self.index)
            .ok()
            .and_then(|i| self.keys.get(i))
            .ok_or(Error::IndexOutOfRange)?;
        debug!(bucket_id = self.bucket.id(), key = %key.escape_ascii(), "cursor delete");
        self.bucket.delete(key)
    }
}
