//! Summary: Process-wide registry of database drivers.
//! Copyright (c) YOAB. All rights reserved.
//!
//! Code written against a generic "open a database of type X" entry point
//! looks drivers up here by name. The registry starts out with the
//! in-memory [`DB_TYPE`] driver.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::db::Database;
use crate::error::{Error, Result};

/// Type name of the built-in in-memory driver.
pub const DB_TYPE: &str = "tempdb";

/// Constructor signature shared by `create` and `open`.
pub type Constructor = fn(&Path) -> Result<Database>;

/// A named pair of constructors.
#[derive(Debug, Clone, Copy)]
pub struct Driver {
    /// Name the driver is registered under.
    pub db_type: &'static str,
    /// Creates a new database.
    pub create: Constructor,
    /// Opens an existing database.
    pub open: Constructor,
}

impl Driver {
    /// The built-in in-memory driver.
    pub fn tempdb() -> Self {
        Self {
            db_type: DB_TYPE,
            create: |path| Database::create(path),
            open: |path| Database::open(path),
        }
    }
}

static DRIVERS: Lazy<RwLock<HashMap<&'static str, Driver>>> = Lazy::new(|| {
    let builtin = Driver::tempdb();
    RwLock::new(HashMap::from([(builtin.db_type, builtin)]))
});

/// Registers a driver.
///
/// # Errors
///
/// Returns `DuplicateDriver` if a driver with the same type is registered.
pub fn register_driver(driver: Driver) -> Result<()> {
    let mut drivers = DRIVERS.write();
    if drivers.contains_key(driver.db_type) {
        return Err(Error::DuplicateDriver {
            db_type: driver.db_type.to_string(),
        });
    }

    debug!(db_type = driver.db_type, "registered driver");
    drivers.insert(driver.db_type, driver);
    Ok(())
}

/// Returns the registered driver types in sorted order.
pub fn supported_drivers() -> Vec<&'static str> {
    let mut types: Vec<&'static str> = DRIVERS.read().keys().copied().collect();
    types.sort_unstable();
    types
}

fn lookup(db_type: &str) -> Result<Driver> {
    DRIVERS
        .read()
        .get(db_type)
        .copied()
        .ok_or_else(|| Error::UnknownDbType {
            db_type: db_type.to_string(),
        })
}

/// Creates a database through the driver registered as `db_type`.
///
/// # Errors
///
/// Returns `UnknownDbType` if no such driver is registered, or the driver's
/// own error.
pub fn create<P: AsRef<Path>>(db_type: &str, path: P) -> Result<Database> {
    let driver = lookup(db_type)?;
    (driver.create)(path.as_ref())
}

/// Opens a database through the driver registered as `db_type`.
///
/// # Errors
///
/// Returns `UnknownDbType` if no such driver is registered, or the driver's
/// own error. The built-in driver always fails with `DbDoesNotExist`.
pub fn open<P: AsRef<Path>>(db_type: &str, path: P) -> Result<Database> {
    let driver = lookup(db_type)?;
    (driver.open)(path.as_ref())
}
