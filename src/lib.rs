//! Summary: A memory-only, transactional, hierarchical key-value engine.
//! Copyright (c) YOAB. All rights reserved.
//!
//! tempdb offers the bucket/cursor/transaction model of embedded stores such
//! as bbolt without any persistence. Every database starts empty and
//! disappears with its handle, which makes it a drop-in store for tests and
//! ephemeral runs.
//!
//! # Example
//!
//! ```
//! use tempdb::{Database, Error};
//!
//! let db = Database::create("scratch.db")?;
//!
//! db.update(
//!     |tx| {
//!         let users = tx.create_top_level_bucket(b"users")?;
//!         users.put(b"alice", b"admin")?;
//!         users.create_bucket(b"sessions")?;
//!         Ok::<(), Error>(())
//!     },
//!     || {},
//! )?;
//!
//! let role = db.view(
//!     |tx| Ok::<_, Error>(tx.read_bucket(b"users").and_then(|b| b.get(b"alice"))),
//!     || {},
//! )?;
//! assert_eq!(role.as_deref(), Some(&b"admin"[..]));
//! # Ok::<(), Error>(())
//! ```
//!
//! # Diagnostics
//!
//! Operations emit `tracing` events at debug level. Without an installed
//! subscriber they are discarded.

pub mod bucket;
pub mod cursor;
pub mod db;
pub mod driver;
pub mod error;
pub mod state;
pub mod tx;

pub use bucket::Bucket;
pub use cursor::{Cursor, KeyValue};
pub use db::{Database, DatabaseConfig};
pub use driver::{DB_TYPE, Driver};
pub use error::{Error, Result};
pub use state::{BucketId, BucketRecord, Entry, ROOT_BUCKET_ID, State};
pub use tx::{Transaction, TxStatus};
