//! Password wrapping of data-protection keys.
//!
//! A store's documents are encrypted under a random data-protection key
//! (DPK). The DPK itself is persisted only as a password-wrapped envelope:
//! the password is stretched with PBKDF2 over a random salt, and the resulting
//! key seals the DPK bytes. Salt and iteration count travel in the envelope.

use crate::cipher::EnvelopeCipher;
use crate::envelope::{Envelope, KdfParams};
use crate::error::{CodecError, CodecResult};
use crate::key::{generate_salt, SecretKey};
use zeroize::Zeroizing;

/// Wraps `key` under `password` using a fresh salt.
///
/// # Errors
///
/// Fails for an empty password or a zero iteration count.
pub fn wrap_key(key: &SecretKey, password: &str, iterations: u32) -> CodecResult<Envelope> {
    let salt = generate_salt();
    let kek = SecretKey::derive_from_password(password.as_bytes(), &salt, iterations)?;
    let cipher = EnvelopeCipher::new(&kek)?;
    cipher.seal_inner(
        key.as_bytes(),
        Some(KdfParams {
            salt: salt.to_vec(),
            iterations,
        }),
    )
}

/// Recovers the key sealed by [`wrap_key`].
///
/// # Errors
///
/// Returns [`CodecError::Authentication`] when the password is wrong, and a
/// structural error when the envelope lacks key-derivation parameters.
pub fn unwrap_key(envelope: &Envelope, password: &str) -> CodecResult<SecretKey> {
    let kdf = envelope
        .kdf
        .as_ref()
        .ok_or_else(|| CodecError::malformed("wrapped key carries no salt"))?;
    let kek = SecretKey::derive_from_password(password.as_bytes(), &kdf.salt, kdf.iterations)?;
    let cipher = EnvelopeCipher::new(&kek)?;
    let bytes = Zeroizing::new(cipher.open(envelope)?);
    SecretKey::from_bytes(&bytes)
}
