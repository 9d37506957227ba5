//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the storage driver.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQL engine reported an error.
    #[error("sqlite error: {message}")]
    Sqlite {
        /// Diagnostic message from the engine.
        message: String,
        /// The underlying engine error.
        #[source]
        source: rusqlite::Error,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The connection has been closed.
    #[error("store is closed")]
    Closed,

    /// A transaction is already open on this connection.
    #[error("a transaction is already active")]
    TransactionActive,

    /// Commit or rollback was requested with no open transaction.
    #[error("no active transaction")]
    NoTransaction,

    /// Another handle holds the store directory lock.
    #[error("store locked: another handle has exclusive access")]
    StoreLocked,

    /// A store path or user name cannot be used.
    #[error("invalid store path: {0}")]
    InvalidPath(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(source: rusqlite::Error) -> Self {
        Self::Sqlite {
            message: source.to_string(),
            source,
        }
    }
}
