//! Summary: Error types for the tempdb engine.
//! Copyright (c) YOAB. All rights reserved.

use thiserror::Error;

/// Result type alias for tempdb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tempdb operations.
///
/// Lookups that simply find nothing (`get`, nested bucket lookups) report
/// absence through `Option` and never produce one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// A put or delete was attempted with an empty key.
    #[error("key required")]
    KeyRequired,
    /// A bucket was created with an empty name.
    #[error("bucket name required")]
    BucketNameRequired,
    /// The key refers to an entry of the wrong kind for the operation.
    #[error("incompatible value")]
    IncompatibleValue,
    /// A nested bucket with the same key already exists.
    #[error("bucket already exists")]
    BucketExists,
    /// The bucket does not exist (or was deleted).
    #[error("bucket not found")]
    BucketNotFound,
    /// Commit or rollback on a transaction that already finished.
    #[error("tx closed")]
    TxClosed,
    /// A cursor operation was issued while not positioned on an element.
    #[error("current index out of range")]
    IndexOutOfRange,
    /// The operation is intentionally not supported by a memory-only engine.
    #[error("unimplemented")]
    Unimplemented,
    /// Opening an existing store; tempdb stores only exist while in memory.
    #[error("database does not exist")]
    DbDoesNotExist,
    /// A database was created without a path identifier.
    #[error("path argument is required")]
    PathRequired,
    /// No driver is registered under the requested type.
    #[error("unknown database type: {db_type}")]
    UnknownDbType {
        /// The requested database type.
        db_type: String,
    },
    /// A driver with the same type is already registered.
    #[error("duplicate driver registration: {db_type}")]
    DuplicateDriver {
        /// The database type that collided.
        db_type: String,
    },
    /// A transaction reached a commit path of a database it does not belong to.
    #[error("not a valid transaction")]
    InvalidTransaction,
}
