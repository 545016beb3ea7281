//! Summary: Database handle, configuration, and transaction entry points.
//! Copyright (c) YOAB. All rights reserved.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::state::State;
use crate::tx::Transaction;

/// Configuration for a database handle.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Serialize `update` and `batch` calls on this handle.
    ///
    /// Transactions obtained from [`Database::begin_read_write_tx`] are never
    /// serialized; among those the last commit wins.
    pub serialize_updates: bool,
    /// Attach values (not only keys) to trace events.
    pub trace_values: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            serialize_updates: true,
            trace_values: false,
        }
    }
}

/// The main database handle.
///
/// A `Database` is always created empty and lives only in memory; the path
/// it is created with is an identifier and is never written to.
///
/// # Concurrency
///
/// - Any number of transactions may be active at once, each on its own
///   snapshot of the state.
/// - Commit replaces the whole state: the last transaction to commit wins.
/// - `update`/`batch` calls are serialized when
///   [`DatabaseConfig::serialize_updates`] is set (the default).
#[derive(Debug)]
pub struct Database {
    /// Path identifier the database was created with.
    path: PathBuf,
    /// The live state every new transaction snapshots.
    state: Arc<RwLock<State>>,
    /// Held for the duration of an `update` when updates are serialized.
    update_lock: Mutex<()>,
    config: DatabaseConfig,
}

impl Database {
    /// Creates a new, empty database with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `PathRequired` if `path` is empty.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_config(path, DatabaseConfig::default())
    }

    /// Creates a new, empty database with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `PathRequired` if `path` is empty.
    pub fn with_config<P: AsRef<Path>>(path: P, config: DatabaseConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::PathRequired);
        }

        debug!(path = %path.display(), ?config, "created database");

        Ok(Self {
            path: path.to_path_buf(),
            state: Arc::new(RwLock::new(State::new())),
            update_lock: Mutex::new(()),
            config,
        })
    }

    /// Opens an existing database.
    ///
    /// # Errors
    ///
    /// Always returns `DbDoesNotExist`: a tempdb database never outlives its
    /// handle.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        debug!(path = %path.as_ref().display(), "open requested for in-memory database");
        Err(Error::DbDoesNotExist)
    }

    /// Returns the path identifier.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the handle's configuration.
    #[inline]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Returns a deep copy of the live state.
    pub fn snapshot(&self) -> State {
        self.state.read().snapshot()
    }

    /// Begins a transaction intended for reading.
    ///
    /// This is the same kind of transaction as [`Database::begin_read_write_tx`].
    pub fn begin_read_tx(&self) -> Result<Transaction> {
        debug!("begin read transaction");
        Ok(Transaction::begin(Arc::clone(&self.state), self.config.trace_values))
    }

    /// Begins a read-write transaction.
    ///
    /// Changes become visible to later transactions only after `commit()`.
    pub fn begin_read_write_tx(&self) -> Result<Transaction> {
        debug!("begin read/write transaction");
        Ok(Transaction::begin(Arc::clone(&self.state), self.config.trace_values))
    }

    /// Runs `f` in a transaction that is never committed.
    ///
    /// `reset` is invoked before the transaction begins.
    pub fn view<F, R, T, E>(&self, f: F, reset: R) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction) -> std::result::Result<T, E>,
        R: FnOnce(),
        E: From<Error>,
    {
        debug!("new view");

        reset();
        let tx = self.begin_read_tx()?;
        f(&tx)
    }

    /// Runs `f` in a transaction and commits it if `f` succeeds.
    ///
    /// `reset` is invoked before the transaction begins. If `f` fails the
    /// transaction is rolled back and the error returned. If `f` closed the
    /// transaction itself, nothing more is done.
    ///
    /// With [`DatabaseConfig::serialize_updates`] set, calling `update` or
    /// `batch` on the same handle from inside `f` deadlocks.
    pub fn update<F, R, T, E>(&self, f: F, reset: R) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction) -> std::result::Result<T, E>,
        R: FnOnce(),
        E: From<Error>,
    {
        debug!("new update");

        reset();
        let _guard = self.config.serialize_updates.then(|| self.update_lock.lock());

        let tx = self.begin_read_write_tx()?;
        let value = match f(&tx) {
            Ok(value) => value,
            Err(err) => {
                if !tx.is_closed() {
                    tx.rollback()?;
                }
                return Err(err);
            }
        };

        if tx.is_closed() {
            debug!(tx_id = tx.id(), status = ?tx.status(), "update closed by callback");
            return Ok(value);
        }

        self.commit(&tx)?;
        Ok(value)
    }

    /// Runs `f` through [`Database::update`] with a no-op reset hook.
    pub fn batch<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Transaction) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        debug!("new batch");
        self.update(f, || {})
    }

    /// Commits `tx`, checking that it belongs to this database.
    fn commit(&self, tx: &Transaction) -> Result<()> {
        if !tx.targets(&self.state) {
            warn!(tx_id = tx.id(), "refusing to commit foreign transaction");
            return Err(Error::InvalidTransaction);
        }
        tx.commit()
    }

    /// Closes the database. Nothing is flushed since nothing is persisted.
    pub fn close(&self) -> Result<()> {
        debug!(path = %self.path.display(), "close database");
        Ok(())
    }

    /// Writes a copy of the database to `writer`.
    ///
    /// # Errors
    ///
    /// Always returns `Unimplemented`.
    pub fn copy<W: Write>(&self, _writer: &mut W) -> Result<()> {
        Err(Error::Unimplemented)
    }

    /// Returns database statistics.
    ///
    /// Statistics are not tracked, so this is always the `Unimplemented`
    /// error message.
    pub fn print_stats(&self) -> String {
        Error::Unimplemented.to_string()
    }
}
