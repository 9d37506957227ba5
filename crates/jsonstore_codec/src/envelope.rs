//! Versioned envelope container and its wire format.
//!
//! An envelope is serialized as a JSON object so it can be exchanged with
//! other implementations of the store:
//!
//! ```text
//! {"version":1,"src":"rust","iv":"<b64>","ct":"<b64>","mac":"<b64>"}
//! {"version":1,"src":"rust","iv":"<b64>","ct":"<b64>","mac":"<b64>","salt":"<b64>","iterations":10000}
//! ```
//!
//! The second form is only used for password-wrapped keys.

use crate::error::{CodecError, CodecResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Envelope format version written by this implementation.
pub const FORMAT_VERSION: u32 = 1;
/// Source tag written by this implementation.
pub const SOURCE_TAG: &str = "rust";
/// Source tags whose envelopes this implementation can open.
pub const KNOWN_SOURCES: &[&str] = &["rust", "java", "objc", "js"];
/// Size of the CBC initialization vector in bytes.
pub const IV_SIZE: usize = 16;
/// Size of the HMAC-SHA256 tag in bytes.
pub const MAC_SIZE: usize = 32;
/// AES block size.
pub(crate) const BLOCK_SIZE: usize = 16;

/// Key-derivation parameters carried by password-wrapped envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Random salt fed to PBKDF2.
    pub salt: Vec<u8>,
    /// PBKDF2 iteration count.
    pub iterations: u32,
}

/// An encrypted payload together with everything needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Format version.
    pub version: u32,
    /// Tag of the implementation that produced the envelope.
    pub source: String,
    /// CBC initialization vector.
    pub iv: Vec<u8>,
    /// AES-256-CBC cipher text (PKCS#7 padded).
    pub cipher_text: Vec<u8>,
    /// HMAC-SHA256 over the authenticated fields.
    pub mac: Vec<u8>,
    /// Present only for password-wrapped keys.
    pub kdf: Option<KdfParams>,
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    version: u32,
    src: String,
    iv: String,
    ct: String,
    mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iterations: Option<u32>,
}

impl Envelope {
    /// Serializes the envelope to its JSON wire form.
    pub fn encode(&self) -> CodecResult<String> {
        let wire = WireEnvelope {
            version: self.version,
            src: self.source.clone(),
            iv: BASE64.encode(&self.iv),
            ct: BASE64.encode(&self.cipher_text),
            mac: BASE64.encode(&self.mac),
            salt: self.kdf.as_ref().map(|k| BASE64.encode(&k.salt)),
            iterations: self.kdf.as_ref().map(|k| k.iterations),
        };
        serde_json::to_string(&wire).map_err(|e| CodecError::malformed(e.to_string()))
    }

    /// Parses and validates an envelope from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Fails for empty input, unparsable JSON or base64, an unknown version or
    /// source tag, and a wrong IV length. No key is needed for these checks.
    pub fn decode(input: &str) -> CodecResult<Self> {
        if input.trim().is_empty() {
            return Err(CodecError::EmptyInput);
        }

        let wire: WireEnvelope =
            serde_json::from_str(input).map_err(|e| CodecError::malformed(e.to_string()))?;

        let kdf = match (wire.salt, wire.iterations) {
            (None, None) => None,
            (Some(salt), Some(iterations)) => Some(KdfParams {
                salt: decode_field("salt", &salt)?,
                iterations,
            }),
            _ => return Err(CodecError::malformed("salt and iterations must appear together")),
        };

        let envelope = Self {
            version: wire.version,
            source: wire.src,
            iv: decode_field("iv", &wire.iv)?,
            cipher_text: decode_field("ct", &wire.ct)?,
            mac: decode_field("mac", &wire.mac)?,
            kdf,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Checks the structural invariants of the envelope.
    pub fn validate(&self) -> CodecResult<()> {
        if self.version != FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(self.version));
        }
        if !KNOWN_SOURCES.contains(&self.source.as_str()) {
            return Err(CodecError::UnknownSource(self.source.clone()));
        }
        if self.iv.len() != IV_SIZE {
            return Err(CodecError::IvLength {
                expected: IV_SIZE,
                actual: self.iv.len(),
            });
        }
        if self.cipher_text.is_empty() {
            return Err(CodecError::EmptyInput);
        }
        if self.cipher_text.len() % BLOCK_SIZE != 0 {
            return Err(CodecError::malformed("cipher text is not block aligned"));
        }
        if self.mac.len() != MAC_SIZE {
            return Err(CodecError::malformed("bad MAC length"));
        }
        if let Some(kdf) = &self.kdf {
            if kdf.iterations == 0 {
                return Err(CodecError::InvalidIterations);
            }
            if kdf.salt.is_empty() {
                return Err(CodecError::malformed("empty salt"));
            }
        }
        Ok(())
    }

    /// Bytes covered by the MAC, in wire field order.
    pub(crate) fn authenticated_bytes(
        version: u32,
        source: &str,
        iv: &[u8],
        cipher_text: &[u8],
        kdf: Option<&KdfParams>,
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + source.len() + iv.len() + cipher_text.len());
        out.extend_from_slice(&version.to_be_bytes());
        push_framed(&mut out, source.as_bytes());
        push_framed(&mut out, iv);
        push_framed(&mut out, cipher_text);
        if let Some(kdf) = kdf {
            push_framed(&mut out, &kdf.salt);
            out.extend_from_slice(&kdf.iterations.to_be_bytes());
        }
        out
    }
}

fn push_framed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn decode_field(name: &str, value: &str) -> CodecResult<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| CodecError::malformed(format!("{name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            version: FORMAT_VERSION,
            source: SOURCE_TAG.to_string(),
            iv: vec![1; IV_SIZE],
            cipher_text: vec![2; 32],
            mac: vec![3; MAC_SIZE],
            kdf: None,
        }
    }

    #[test]
    fn wire_form_omits_kdf_fields_for_plain_envelopes() {
        let text = sample().encode().unwrap();
        assert!(text.starts_with(r#"{"version":1,"src":"rust","iv":"#));
        assert!(!text.contains("salt"));
        assert!(!text.contains("iterations"));
        assert_eq!(Envelope::decode(&text).unwrap(), sample());
    }

    #[test]
    fn wire_form_carries_kdf_fields() {
        let mut env = sample();
        env.kdf = Some(KdfParams {
            salt: vec![9; 32],
            iterations: 10_000,
        });
        let text = env.encode().unwrap();
        assert!(text.contains(r#""iterations":10000"#));
        assert_eq!(Envelope::decode(&text).unwrap(), env);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(Envelope::decode(""), Err(CodecError::EmptyInput)));
        assert!(matches!(Envelope::decode("   "), Err(CodecError::EmptyInput)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            Envelope::decode("{not json"),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"version":1,"src":"rust","iv":"%%","ct":"","mac":""}"#),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn unknown_version_and_source_are_rejected() {
        let mut env = sample();
        env.version = 2;
        let text = env.encode().unwrap();
        assert!(matches!(
            Envelope::decode(&text),
            Err(CodecError::UnsupportedVersion(2))
        ));

        let mut env = sample();
        env.source = "cobol".to_string();
        let text = env.encode().unwrap();
        assert!(matches!(
            Envelope::decode(&text),
            Err(CodecError::UnknownSource(s)) if s == "cobol"
        ));
    }

    #[test]
    fn iv_length_is_checked() {
        let mut env = sample();
        env.iv = vec![0; 12];
        let text = env.encode().unwrap();
        assert!(matches!(
            Envelope::decode(&text),
            Err(CodecError::IvLength {
                expected: 16,
                actual: 12
            })
        ));
    }

    #[test]
    fn half_kdf_params_are_malformed() {
        let text = r#"{"version":1,"src":"rust","iv":"AAAAAAAAAAAAAAAAAAAAAA==","ct":"AAAAAAAAAAAAAAAAAAAAAA==","mac":"","salt":"AA=="}"#;
        assert!(matches!(
            Envelope::decode(text),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn authenticated_bytes_cover_kdf() {
        let kdf = KdfParams {
            salt: vec![1, 2, 3],
            iterations: 5,
        };
        let without = Envelope::authenticated_bytes(1, "rust", &[0; 16], &[1; 16], None);
        let with = Envelope::authenticated_bytes(1, "rust", &[0; 16], &[1; 16], Some(&kdf));
        assert!(with.starts_with(&without));
        assert!(with.len() > without.len());
    }
}
