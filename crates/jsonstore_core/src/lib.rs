//! # jsonstore core
//!
//! Embedded, offline-first JSON document store.
//!
//! This crate provides:
//! - Schema-driven indexing of declared search fields
//! - Query translation into parameterized SQL predicates
//! - The dirty/clean document lifecycle used for synchronization
//! - Transactional writes and optional encryption at rest
//! - A per-user operation lane that serializes all access to a store
//!
//! ```rust
//! use jsonstore_core::{Config, DirtyState, FieldType, Registry, SearchFields};
//! use serde_json::json;
//!
//! let registry = Registry::new();
//! let store = registry.open(Config::in_memory().username("ann"))?;
//! store.provision("todos", SearchFields::new().with("title", FieldType::String), SearchFields::new())?;
//!
//! let ids = store.store_with("todos", vec![json!({"title": "milk"})], Default::default(), true)?;
//! assert!(store.is_dirty("todos", ids[0])?);
//! assert!(store.mark_clean("todos", ids[0], DirtyState::Add)?);
//! assert_eq!(store.dirty_count("todos")?, 0);
//! # Ok::<(), jsonstore_core::StoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod lane;
mod query;
mod registry;
mod schema;
mod store;
mod types;

pub use config::{Config, DEFAULT_USERNAME};
pub use error::{StoreError, StoreResult};
pub use lane::Pending;
pub use query::{
    Clause, FieldValueMap, FindOptions, Operator, Predicate, QueryPart, SortOrder, Translator,
    ID_FIELD,
};
pub use registry::Registry;
pub use schema::{
    CollectionSchema, FieldType, ProvisionOptions, ProvisionOutcome, SearchField, SearchFields,
};
pub use store::JsonStore;
pub use types::{
    DirtyDocument, DirtyState, Document, DocumentId, FailureReason, ReplaceFailure,
    ReplaceOutcome,
};

pub use jsonstore_codec::DEFAULT_ITERATIONS;
