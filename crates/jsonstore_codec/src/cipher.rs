//! AES-256-CBC + HMAC-SHA256 sealing of byte payloads into envelopes.

use crate::envelope::{Envelope, KdfParams, FORMAT_VERSION, IV_SIZE, SOURCE_TAG};
use crate::error::{CodecError, CodecResult};
use crate::key::{SecretKey, SubKeys};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Seals and opens envelopes under one key.
///
/// Every call to [`seal`](Self::seal) draws a fresh random IV, so the same
/// plaintext never produces the same envelope twice. The MAC is checked before
/// any decryption happens (encrypt-then-MAC).
pub struct EnvelopeCipher {
    keys: SubKeys,
}

impl EnvelopeCipher {
    /// Creates a cipher for the given key.
    pub fn new(key: &SecretKey) -> CodecResult<Self> {
        Ok(Self { keys: key.split()? })
    }

    /// Encrypts `plaintext` into a new envelope.
    pub fn seal(&self, plaintext: &[u8]) -> CodecResult<Envelope> {
        self.seal_inner(plaintext, None)
    }

    pub(crate) fn seal_inner(
        &self,
        plaintext: &[u8],
        kdf: Option<KdfParams>,
    ) -> CodecResult<Envelope> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let cipher_text = Aes256CbcEnc::new_from_slices(&self.keys.enc, &iv)
            .map_err(|_| CodecError::KeyDerivation("cipher init failed".to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mac = self.compute_mac(FORMAT_VERSION, SOURCE_TAG, &iv, &cipher_text, kdf.as_ref())?;

        Ok(Envelope {
            version: FORMAT_VERSION,
            source: SOURCE_TAG.to_string(),
            iv: iv.to_vec(),
            cipher_text,
            mac,
            kdf,
        })
    }

    /// Verifies and decrypts an envelope.
    ///
    /// # Errors
    ///
    /// Structural problems are reported before the MAC is checked; a MAC
    /// mismatch yields [`CodecError::Authentication`].
    pub fn open(&self, envelope: &Envelope) -> CodecResult<Vec<u8>> {
        let result = self.open_inner(envelope);
        if let Err(err) = &result {
            debug!(kind = err.kind(), source = %envelope.source, "envelope rejected");
        }
        result
    }

    fn open_inner(&self, envelope: &Envelope) -> CodecResult<Vec<u8>> {
        envelope.validate()?;

        let data = Envelope::authenticated_bytes(
            envelope.version,
            &envelope.source,
            &envelope.iv,
            &envelope.cipher_text,
            envelope.kdf.as_ref(),
        );
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.keys.mac)
            .map_err(|_| CodecError::KeyDerivation("bad MAC key".to_string()))?;
        mac.update(&data);
        mac.verify_slice(&envelope.mac)
            .map_err(|_| CodecError::Authentication)?;

        Aes256CbcDec::new_from_slices(&self.keys.enc, &envelope.iv)
            .map_err(|_| CodecError::IvLength {
                expected: IV_SIZE,
                actual: envelope.iv.len(),
            })?
            .decrypt_padded_vec_mut::<Pkcs7>(&envelope.cipher_text)
            .map_err(|_| CodecError::Padding)
    }

    /// Seals `plaintext` and returns the envelope's wire form.
    pub fn encrypt_to_string(&self, plaintext: &[u8]) -> CodecResult<String> {
        self.seal(plaintext)?.encode()
    }

    /// Parses a wire-form envelope and opens it.
    pub fn decrypt_str(&self, wire: &str) -> CodecResult<Vec<u8>> {
        let envelope = Envelope::decode(wire).inspect_err(|err| {
            debug!(kind = err.kind(), "envelope decode failed");
        })?;
        self.open(&envelope)
    }

    fn compute_mac(
        &self,
        version: u32,
        source: &str,
        iv: &[u8],
        cipher_text: &[u8],
        kdf: Option<&KdfParams>,
    ) -> CodecResult<Vec<u8>> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.keys.mac)
            .map_err(|_| CodecError::KeyDerivation("bad MAC key".to_string()))?;
        mac.update(&Envelope::authenticated_bytes(
            version,
            source,
            iv,
            cipher_text,
            kdf,
        ));
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCipher")
            .field("cipher", &"Aes256Cbc+HmacSha256")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cipher() -> EnvelopeCipher {
        EnvelopeCipher::new(&SecretKey::generate()).unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let c = cipher();
        let body = br#"{"name":"Ann","age":30}"#;
        let env = c.seal(body).unwrap();
        assert_eq!(env.version, FORMAT_VERSION);
        assert_eq!(env.source, SOURCE_TAG);
        assert_ne!(env.cipher_text.as_slice(), body.as_slice());
        assert_eq!(c.open(&env).unwrap(), body);
    }

    #[test]
    fn iv_is_fresh_per_seal() {
        let c = cipher();
        let a = c.seal(b"same").unwrap();
        let b = c.seal(b"same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.cipher_text, b.cipher_text);
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let env = cipher().seal(b"secret").unwrap();
        let err = cipher().open(&env).unwrap_err();
        assert!(matches!(err, CodecError::Authentication));
        assert!(err.is_authentication());
    }

    #[test]
    fn tampering_fails_authentication() {
        let c = cipher();
        let mut env = c.seal(b"secret payload").unwrap();
        env.cipher_text[0] ^= 0x01;
        assert!(matches!(c.open(&env), Err(CodecError::Authentication)));

        let mut env = c.seal(b"secret payload").unwrap();
        env.iv[3] ^= 0x80;
        assert!(matches!(c.open(&env), Err(CodecError::Authentication)));
    }

    #[test]
    fn string_roundtrip() {
        let c = cipher();
        let wire = c.encrypt_to_string(b"[1,2,3]").unwrap();
        assert_eq!(c.decrypt_str(&wire).unwrap(), b"[1,2,3]");
        assert!(matches!(c.decrypt_str(""), Err(CodecError::EmptyInput)));
    }

    #[test]
    fn empty_plaintext_pads_to_one_block() {
        let c = cipher();
        let env = c.seal(b"").unwrap();
        assert_eq!(env.cipher_text.len(), 16);
        assert!(c.open(&env).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn roundtrip_any_payload(data in prop::collection::vec(any::<u8>(), 1..2048)) {
            let c = cipher();
            let env = c.seal(&data).unwrap();
            prop_assert_eq!(c.open(&env).unwrap(), data);
        }
    }
}
