//! # jsonstore Testkit
//!
//! Test utilities for jsonstore.
//!
//! This crate provides:
//! - Test fixtures and store helpers
//! - Property-based test generators using proptest
//! - A model harness that checks a store against an in-memory expectation
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jsonstore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_temp_store(|store| {
//!         store.provision("notes", SearchFields::parse("title:string").unwrap(), SearchFields::new()).unwrap();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
