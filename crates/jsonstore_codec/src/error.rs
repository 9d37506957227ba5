//! Error types for envelope encoding and decryption.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while deriving keys or sealing/opening envelopes.
///
/// The decryption kinds are deliberately fine-grained so they can be logged
/// distinctly. Callers above the codec collapse them (see
/// [`CodecError::is_authentication`]).
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input to decode or decrypt was empty.
    #[error("empty input")]
    EmptyInput,

    /// The envelope could not be parsed.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The envelope was produced by an unknown format version.
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),

    /// The envelope carries a source tag this implementation does not know.
    #[error("unknown envelope source {0:?}")]
    UnknownSource(String),

    /// The initialization vector has the wrong length.
    #[error("invalid IV length: expected {expected} bytes, got {actual}")]
    IvLength {
        /// Required length.
        expected: usize,
        /// Length found in the envelope.
        actual: usize,
    },

    /// MAC verification failed (wrong key or tampered data).
    #[error("authentication failed")]
    Authentication,

    /// Block padding was invalid after a successful MAC check.
    #[error("invalid padding")]
    Padding,

    /// The key derivation function could not produce a key.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Raw key material has the wrong size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Required size.
        expected: usize,
        /// Supplied size.
        actual: usize,
    },

    /// Iteration count is zero or missing on a password-wrapped envelope.
    #[error("invalid iteration count")]
    InvalidIterations,

    /// An empty password was supplied.
    #[error("empty password")]
    EmptyPassword,
}

impl CodecError {
    /// Creates a malformed-envelope error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Returns true when the failure means "wrong key or tampered bytes".
    ///
    /// Padding errors are reported the same way; they can only occur after the
    /// MAC has already been accepted.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication | Self::Padding)
    }

    /// Short label used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::Malformed(_) => "malformed",
            Self::UnsupportedVersion(_) => "unsupported_version",
            Self::UnknownSource(_) => "unknown_source",
            Self::IvLength { .. } => "iv_length",
            Self::Authentication => "authentication",
            Self::Padding => "padding",
            Self::KeyDerivation(_) => "key_derivation",
            Self::InvalidKeySize { .. } => "invalid_key_size",
            Self::InvalidIterations => "invalid_iterations",
            Self::EmptyPassword => "empty_password",
        }
    }
}
