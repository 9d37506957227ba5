//! Error types for jsonstore core.

use jsonstore_codec::CodecError;
use jsonstore_storage::StorageError;
use thiserror::Error;
use tracing::debug;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store operations.
///
/// Every public operation returns one of these rather than partially
/// applying its effects: multi-statement work is rolled back before the
/// error reaches the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The declared search fields are invalid, or a document value does not
    /// fit the declared type of its field.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },

    /// The named collection does not exist.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// A document operation targeted a collection that was never provisioned.
    #[error("collection {collection} has not been provisioned")]
    NotProvisioned {
        /// Name of the collection.
        collection: String,
    },

    /// The store is closed.
    #[error("store is not open")]
    StoreNotOpen,

    /// Begin, commit or rollback failed.
    #[error("transaction failed: {message}")]
    TransactionFailed {
        /// Diagnostic from the storage driver.
        message: String,
    },

    /// The store is encrypted and no password was supplied.
    #[error("store is encrypted and no key was supplied")]
    EncryptionKeyMissing,

    /// Wrong password or corrupted key material.
    #[error("invalid encryption key")]
    EncryptionKeyInvalid,

    /// A persisted envelope is malformed or of an unsupported version.
    #[error("decryption failed: envelope could not be decoded")]
    EnvelopeDecodeFailed,

    /// A query referenced a field that is not a declared search field.
    #[error("field {field:?} is not a search field of collection {collection}")]
    QueryFieldNotIndexed {
        /// Name of the collection.
        collection: String,
        /// The offending field.
        field: String,
    },

    /// A query is structurally invalid.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// Provisioning would drop existing data and the caller did not allow it.
    #[error("schema change for {collection} would drop existing data: {reason}")]
    DestructiveSchemaChange {
        /// Name of the collection.
        collection: String,
        /// Why the new field set is incompatible.
        reason: String,
    },

    /// Low-level driver failure.
    #[error("underlying store error: {0}")]
    UnderlyingStore(#[from] StorageError),

    /// The collection name cannot be used.
    #[error("invalid collection name: {name:?}")]
    InvalidCollectionName {
        /// The rejected name.
        name: String,
    },

    /// A document is not a JSON object.
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Description of the problem.
        message: String,
    },

    /// A store for another user is already open.
    #[error("store for user {active:?} is open; cannot open {requested:?}")]
    UsernameMismatch {
        /// User of the open store.
        active: String,
        /// User that was requested.
        requested: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The operation lane stopped before the operation completed.
    #[error("operation lane closed")]
    LaneClosed,

    /// A stored body could not be parsed as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a not-provisioned error.
    pub fn not_provisioned(collection: impl Into<String>) -> Self {
        Self::NotProvisioned {
            collection: collection.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates a transaction failure from a driver error.
    pub fn transaction_failed(source: impl std::fmt::Display) -> Self {
        Self::TransactionFailed {
            message: source.to_string(),
        }
    }

    /// Creates a query-field-not-indexed error.
    pub fn field_not_indexed(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self::QueryFieldNotIndexed {
            collection: collection.into(),
            field: field.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        debug!(kind = err.kind(), "codec failure");
        match err {
            e if e.is_authentication() => Self::EncryptionKeyInvalid,
            CodecError::EmptyPassword => Self::EncryptionKeyMissing,
            CodecError::KeyDerivation(_) | CodecError::InvalidKeySize { .. } => {
                Self::EncryptionKeyInvalid
            }
            _ => Self::EnvelopeDecodeFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_failures_collapse_to_two_public_kinds() {
        assert!(matches!(
            StoreError::from(CodecError::Authentication),
            StoreError::EncryptionKeyInvalid
        ));
        assert!(matches!(
            StoreError::from(CodecError::Padding),
            StoreError::EncryptionKeyInvalid
        ));
        for err in [
            CodecError::EmptyInput,
            CodecError::malformed("x"),
            CodecError::UnsupportedVersion(9),
            CodecError::UnknownSource("y".into()),
            CodecError::IvLength {
                expected: 16,
                actual: 3,
            },
        ] {
            assert!(matches!(
                StoreError::from(err),
                StoreError::EnvelopeDecodeFailed
            ));
        }
    }

    #[test]
    fn messages_name_the_collection() {
        let err = StoreError::field_not_indexed("people", "shoe_size");
        assert_eq!(
            err.to_string(),
            "field \"shoe_size\" is not a search field of collection people"
        );
    }
}
