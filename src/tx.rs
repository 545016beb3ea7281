//! Summary: Snapshot-isolated transaction type.
//! Copyright (c) YOAB. All rights reserved.
//!
//! A transaction deep-copies the live state when it begins and works only on
//! that private copy. Commit replaces the live state with a copy of the
//! private one; rollback (or drop) simply discards it. There is no conflict
//! detection: the last transaction to commit wins.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::bucket::Bucket;
use crate::error::{Error, Result};
use crate::state::{BucketId, BucketRecord, ROOT_BUCKET_ID, State};

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Open for reads and writes.
    Active,
    /// Successfully committed.
    Committed,
    /// Rolled back; the live state was never touched.
    RolledBack,
}

/// A transaction over a private snapshot of the database.
///
/// Buckets and cursors borrow the transaction, so every handle obtained from
/// it reads and writes the private snapshot only.
///
/// Read and read-write transactions are the same type; read-only access is a
/// convention of the caller.
pub struct Transaction {
    id: u64,
    /// Private working copy.
    state: RefCell<State>,
    /// The live state this transaction commits into.
    live: Arc<RwLock<State>>,
    status: Cell<TxStatus>,
    listeners: RefCell<Vec<Box<dyn FnOnce()>>>,
    trace_values: bool,
}

impl Transaction {
    /// Begins a transaction against the given live state.
    pub(crate) fn begin(live: Arc<RwLock<State>>, trace_values: bool) -> Self {
        let (id, state) = {
            let mut guard = live.write();
            let id = guard.allocate_tx_id();
            (id, guard.snapshot())
        };

        debug!(tx_id = id, buckets = state.buckets().len(), "begin transaction");

        Self {
            id,
            state: RefCell::new(state),
            live,
            status: Cell::new(TxStatus::Active),
            listeners: RefCell::new(Vec::new()),
            trace_values,
        }
    }

    /// Returns the transaction id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the current lifecycle status.
    #[inline]
    pub fn status(&self) -> TxStatus {
        self.status.get()
    }

    /// Returns true once the transaction has been committed or rolled back.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.status.get() != TxStatus::Active
    }

    /// Returns true if the transaction was rolled back.
    #[inline]
    pub fn is_rolled_back(&self) -> bool {
        self.status.get() == TxStatus::RolledBack
    }

    /// Returns true if the transaction was committed.
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.status.get() == TxStatus::Committed
    }

    #[inline]
    pub(crate) fn state(&self) -> Ref<'_, State> {
        self.state.borrow()
    }

    #[inline]
    pub(crate) fn state_mut(&self) -> RefMut<'_, State> {
        self.state.borrow_mut()
    }

    #[inline]
    pub(crate) fn trace_values(&self) -> bool {
        self.trace_values
    }

    /// Returns true if this transaction commits into `live`.
    pub(crate) fn targets(&self, live: &Arc<RwLock<State>>) -> bool {
        Arc::ptr_eq(&self.live, live)
    }

    /// Returns the top-level bucket named `key`.
    ///
    /// Returns `None` if no such bucket exists.
    pub fn read_bucket(&self, key: &[u8]) -> Option<Bucket<'_>> {
        self.read_write_bucket(key)
    }

    /// Returns the top-level bucket named `key` for reading and writing.
    ///
    /// Returns `None` if no such bucket exists.
    pub fn read_write_bucket(&self, key: &[u8]) -> Option<Bucket<'_>> {
        debug!(tx_id = self.id, key = %key.escape_ascii(), "get top level bucket");

        let state = self.state();
        let index = state.find_top_level(key)?;
        Some(Bucket::new(self, state.record(index).id()))
    }

    /// Visits the key of every top-level bucket in creation order.
    ///
    /// Stops at and returns the first error produced by `visit`.
    pub fn for_each_bucket<F, E>(&self, mut visit: F) -> std::result::Result<(), E>
    where
        F: FnMut(&[u8]) -> std::result::Result<(), E>,
    {
        debug!(tx_id = self.id, "for each top level bucket");

        let keys: Vec<Vec<u8>> = self
            .state()
            .buckets()
            .iter()
            .filter(|bkt| bkt.is_top_level())
            .map(|bkt| bkt.key().to_vec())
            .collect();

        for key in &keys {
            visit(key.as_slice())?;
        }
        Ok(())
    }

    /// Returns the top-level bucket named `key`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `BucketNameRequired` if `key` is empty.
    pub fn create_top_level_bucket(&self, key: &[u8]) -> Result<Bucket<'_>> {
        debug!(tx_id = self.id, key = %key.escape_ascii(), "create top level bucket");

        if key.is_empty() {
            return Err(Error::BucketNameRequired);
        }

        let existing = {
            let state = self.state();
            state
                .find_top_level(key)
                .map(|index| state.record(index).id())
        };
        let id = match existing {
            Some(id) => id,
            None => self.allocate_bucket(ROOT_BUCKET_ID, key),
        };
        Ok(Bucket::new(self, id))
    }

    /// Deletes the top-level bucket named `key` and everything nested in it.
    ///
    /// Does nothing if the bucket does not exist.
    pub fn delete_top_level_bucket(&self, key: &[u8]) -> Result<()> {
        debug!(tx_id = self.id, key = %key.escape_ascii(), "delete top level bucket");

        let mut state = self.state_mut();
        if let Some(index) = state.find_top_level(key) {
            let removed = state.remove_bucket(index);
            debug!(tx_id = self.id, removed, "removed bucket records");
        }
        Ok(())
    }

    /// Registers a callback to run after a successful commit.
    ///
    /// Callbacks run in registration order and never run on rollback.
    pub fn on_commit<F>(&self, listener: F)
    where
        F: FnOnce() + 'static,
    {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    /// Commits the transaction.
    ///
    /// The live state is replaced with a copy of this transaction's state,
    /// discarding anything committed since this transaction began.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed` if the transaction was already committed or rolled back.
    pub fn commit(&self) -> Result<()> {
        debug!(tx_id = self.id, "commit transaction");

        if self.is_closed() {
            return Err(Error::TxClosed);
        }

        let mut snapshot = self.state().snapshot();
        {
            let mut live = self.live.write();
            snapshot.advance_counters(live.next_bucket_id(), live.next_tx_id());
            *live = snapshot;
        }
        self.status.set(TxStatus::Committed);

        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        debug!(tx_id = self.id, listeners = listeners.len(), "run commit listeners");
        for listener in listeners {
            listener();
        }
        Ok(())
    }

    /// Rolls back the transaction, leaving the live state untouched.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed` if the transaction was already committed or rolled back.
    pub fn rollback(&self) -> Result<()> {
        debug!(tx_id = self.id, "rollback transaction");

        if self.is_closed() {
            return Err(Error::TxClosed);
        }

        self.status.set(TxStatus::RolledBack);
        self.listeners.borrow_mut().clear();
        Ok(())
    }

    /// Allocates a new empty bucket record under `parent`.
    pub(crate) fn allocate_bucket(&self, parent: BucketId, key: &[u8]) -> BucketId {
        let id = self.state_mut().add(BucketRecord::new(parent, key));
        debug!(tx_id = self.id, bucket_id = id, parent_id = parent, "allocated bucket");
        id
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("status", &self.status.get())
            .field("listeners", &self.listeners.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // An active transaction dropped here simply loses its private state.
        if self.status.get() == TxStatus::Active {
            debug!(tx_id = self.id, "discarding uncommitted transaction");
        }
    }
}
