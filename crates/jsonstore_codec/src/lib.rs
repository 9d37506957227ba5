//! # jsonstore codec
//!
//! Encryption-at-rest primitives for jsonstore.
//!
//! This crate knows nothing about documents or collections. It provides:
//! - PBKDF2-HMAC-SHA256 key derivation from passwords ([`SecretKey`])
//! - AES-256-CBC encryption with a fresh random IV per call and an
//!   HMAC-SHA256 tag ([`EnvelopeCipher`])
//! - A versioned, source-tagged [`Envelope`] with a JSON wire form shared with
//!   other implementations of the store
//! - Password wrapping of data-protection keys ([`wrap_key`], [`unwrap_key`])
//!
//! ## Example
//!
//! ```rust
//! use jsonstore_codec::{EnvelopeCipher, SecretKey};
//!
//! let key = SecretKey::generate();
//! let cipher = EnvelopeCipher::new(&key).unwrap();
//! let wire = cipher.encrypt_to_string(br#"{"name":"Ann"}"#).unwrap();
//! assert_eq!(cipher.decrypt_str(&wire).unwrap(), br#"{"name":"Ann"}"#);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cipher;
mod envelope;
mod error;
mod key;
mod wrap;

pub use cipher::EnvelopeCipher;
pub use envelope::{Envelope, KdfParams, FORMAT_VERSION, IV_SIZE, KNOWN_SOURCES, MAC_SIZE, SOURCE_TAG};
pub use error::{CodecError, CodecResult};
pub use key::{generate_salt, SecretKey, DEFAULT_ITERATIONS, KEY_SIZE, SALT_SIZE};
pub use wrap::{unwrap_key, wrap_key};
