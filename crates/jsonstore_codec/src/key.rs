//! Key material and password-based key derivation.

use crate::error::{CodecError, CodecResult};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of a password salt in bytes.
pub const SALT_SIZE: usize = 32;
/// PBKDF2 iteration count used for new password-wrapped keys.
pub const DEFAULT_ITERATIONS: u32 = 10_000;

const ENC_INFO: &[u8] = b"jsonstore/v1/enc";
const MAC_INFO: &[u8] = b"jsonstore/v1/mac";

/// A 256-bit symmetric key.
///
/// The key is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; KEY_SIZE],
}

impl SecretKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CodecError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Derives a key from a password with PBKDF2-HMAC-SHA256.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty password, an empty salt or a zero
    /// iteration count.
    pub fn derive_from_password(password: &[u8], salt: &[u8], iterations: u32) -> CodecResult<Self> {
        if password.is_empty() {
            return Err(CodecError::EmptyPassword);
        }
        if salt.is_empty() {
            return Err(CodecError::KeyDerivation("empty salt".to_string()));
        }
        if iterations == 0 {
            return Err(CodecError::InvalidIterations);
        }

        let mut bytes = [0u8; KEY_SIZE];
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut bytes);
        Ok(Self { bytes })
    }

    /// Returns the raw key bytes.
    ///
    /// Don't log or persist the result unencrypted.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Splits this key into independent encryption and MAC sub-keys.
    pub(crate) fn split(&self) -> CodecResult<SubKeys> {
        let hk = Hkdf::<Sha256>::new(None, &self.bytes);
        let mut keys = SubKeys {
            enc: [0u8; KEY_SIZE],
            mac: [0u8; KEY_SIZE],
        };
        hk.expand(ENC_INFO, &mut keys.enc)
            .map_err(|_| CodecError::KeyDerivation("HKDF expand failed".to_string()))?;
        hk.expand(MAC_INFO, &mut keys.mac)
            .map_err(|_| CodecError::KeyDerivation("HKDF expand failed".to_string()))?;
        Ok(keys)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encryption and MAC keys derived from one [`SecretKey`].
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct SubKeys {
    pub(crate) enc: [u8; KEY_SIZE],
    pub(crate) mac: [u8; KEY_SIZE],
}

/// Generates a fresh random salt.
#[must_use]
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
