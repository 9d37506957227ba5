//! # jsonstore storage
//!
//! The relational storage driver for jsonstore.
//!
//! This crate is the only place that talks to the SQL engine. It provides:
//! - [`SqliteDriver`]: one connection, parameterized statements only,
//!   explicit begin/commit/rollback with a single open transaction at a time
//! - [`Statement`]: a statement template plus ordered bind parameters
//! - [`StoreDir`]: the locked per-user directory that holds the store file
//!
//! The driver does not know about documents, schemas or encryption.
//!
//! ## Example
//!
//! ```rust
//! use jsonstore_storage::{SqliteDriver, Statement};
//!
//! let mut driver = SqliteDriver::open_in_memory().unwrap();
//! driver.execute_batch("CREATE TABLE t (v TEXT)").unwrap();
//! driver.begin().unwrap();
//! driver
//!     .insert(&Statement::new("INSERT INTO t (v) VALUES (?)").bind("hello".to_string()))
//!     .unwrap();
//! driver.commit().unwrap();
//! let rows = driver.select(&Statement::new("SELECT v FROM t")).unwrap();
//! assert_eq!(rows[0].text(0), Some("hello"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dir;
mod driver;
mod error;
mod statement;

pub use dir::{destroy_store_directory, StoreDir};
pub use driver::{casefold, DriverOptions, JournalMode, SqliteDriver, CASEFOLD_FUNCTION};
pub use error::{StorageError, StorageResult};
pub use statement::{quote_ident, Row, SqlValue, Statement};
