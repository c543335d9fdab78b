//! AES-256-GCM codec with a marker-prefix wire format.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

/// AES-GCM nonce size (96 bits).
const NONCE_SIZE: usize = 12;

/// Prefix marking a value as ciphertext. Values without it are treated as
/// legacy plaintext and pass through `decrypt` unchanged.
pub const ENC_MARKER: &str = "enc:v2:";

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed: ciphertext rejected")]
    Decrypt,
    #[error("malformed ciphertext: {0}")]
    Malformed(String),
}

/// Reversible transform for sensitive text fields.
///
/// Wire format: `enc:v2:` + base64(nonce || AES-256-GCM ciphertext), with a
/// fresh nonce per call. Tampered ciphertext fails authentication and is
/// rejected rather than silently decrypted.
#[derive(Clone)]
pub struct FieldCodec {
    cipher: Aes256Gcm,
}

impl FieldCodec {
    pub fn new(key: &[u8; 32]) -> Self {
        // new_from_slice cannot fail for a 32-byte key.
        let cipher = Aes256Gcm::new_from_slice(key)
            .unwrap_or_else(|_| unreachable!("32-byte key is always valid for AES-256"));
        Self { cipher }
    }

    /// Build a codec from raw key bytes, rejecting anything but 32 bytes.
    pub fn from_key_bytes(key: &[u8]) -> Result<Self, CryptoError> {
        let key: &[u8; 32] = key
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("expected 32 bytes, got {}", key.len())))?;
        Ok(Self::new(key))
    }

    /// Encrypt `plaintext` into a marked, base64-armored string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut payload = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", ENC_MARKER, BASE64.encode(payload)))
    }

    /// Decrypt a marked string; unmarked text is returned as-is.
    pub fn decrypt(&self, text: &str) -> Result<String, CryptoError> {
        let Some(armored) = text.strip_prefix(ENC_MARKER) else {
            return Ok(text.to_string());
        };
        let payload = BASE64
            .decode(armored)
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;
        if payload.len() <= NONCE_SIZE {
            return Err(CryptoError::Malformed("payload shorter than nonce".to_string()));
        }
        let nonce = Nonce::from_slice(&payload[..NONCE_SIZE]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &payload[NONCE_SIZE..])
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|e| CryptoError::Malformed(e.to_string()))
    }

    /// Encrypt the allowlisted string fields of a JSON snapshot in place.
    /// Fields outside the allowlist and non-string values are untouched.
    pub fn encrypt_fields(&self, entity_type: &str, value: &mut serde_json::Value) {
        let Some(obj) = value.as_object_mut() else {
            return;
        };
        for field in crate::sensitive_fields(entity_type) {
            if let Some(serde_json::Value::String(s)) = obj.get(*field) {
                if s.starts_with(ENC_MARKER) {
                    continue;
                }
                if let Ok(ciphertext) = self.encrypt(s) {
                    obj.insert((*field).to_string(), serde_json::Value::String(ciphertext));
                }
            }
        }
    }

    /// Decrypt the allowlisted string fields of a JSON snapshot in place.
    /// Fields that fail authentication are left encrypted.
    pub fn decrypt_fields(&self, entity_type: &str, value: &mut serde_json::Value) {
        let Some(obj) = value.as_object_mut() else {
            return;
        };
        for field in crate::sensitive_fields(entity_type) {
            if let Some(serde_json::Value::String(s)) = obj.get(*field) {
                if let Ok(plaintext) = self.decrypt(s) {
                    obj.insert((*field).to_string(), serde_json::Value::String(plaintext));
                }
            }
        }
    }
}

impl std::fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug.
        f.debug_struct("FieldCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> FieldCodec {
        FieldCodec::new(&[7u8; 32])
    }

    #[test]
    fn round_trip_preserves_plaintext() {
        let c = codec();
        for text in ["a", "hello world", "Bit by a classmate during naptime. Calmed after 10min."] {
            let encrypted = c.encrypt(text).unwrap();
            assert!(encrypted.starts_with(ENC_MARKER));
            assert_ne!(encrypted, text);
            assert_eq!(c.decrypt(&encrypted).unwrap(), text);
        }
    }

    #[test]
    fn decrypt_is_identity_on_unmarked_text() {
        let c = codec();
        assert_eq!(c.decrypt("plain legacy note").unwrap(), "plain legacy note");
        assert_eq!(c.decrypt("").unwrap(), "");
    }

    #[test]
    fn fresh_nonce_per_call() {
        let c = codec();
        let a = c.encrypt("same input").unwrap();
        let b = c.encrypt("same input").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.decrypt(&a).unwrap(), c.decrypt(&b).unwrap());
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let c = codec();
        let encrypted = c.encrypt("sensitive").unwrap();
        let armored = encrypted.strip_prefix(ENC_MARKER).unwrap();
        let mut payload = BASE64.decode(armored).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        let tampered = format!("{}{}", ENC_MARKER, BASE64.encode(payload));
        assert!(matches!(c.decrypt(&tampered), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let encrypted = codec().encrypt("sensitive").unwrap();
        let other = FieldCodec::new(&[9u8; 32]);
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn from_key_bytes_rejects_short_keys() {
        assert!(FieldCodec::from_key_bytes(&[1u8; 16]).is_err());
        assert!(FieldCodec::from_key_bytes(&[1u8; 32]).is_ok());
    }

    #[test]
    fn encrypt_fields_touches_only_the_allowlist() {
        let c = codec();
        let mut snapshot = json!({
            "description": "hit a peer during circle time",
            "child_id": "c-42",
            "severity": "minor"
        });
        c.encrypt_fields("behavior_logs", &mut snapshot);
        let desc = snapshot["description"].as_str().unwrap();
        assert!(desc.starts_with(ENC_MARKER));
        assert_eq!(snapshot["child_id"], "c-42");
        assert_eq!(snapshot["severity"], "minor");

        c.decrypt_fields("behavior_logs", &mut snapshot);
        assert_eq!(snapshot["description"], "hit a peer during circle time");
    }

    #[test]
    fn encrypt_fields_skips_already_encrypted_values() {
        let c = codec();
        let mut snapshot = json!({ "description": "note" });
        c.encrypt_fields("behavior_logs", &mut snapshot);
        let once = snapshot["description"].as_str().unwrap().to_string();
        c.encrypt_fields("behavior_logs", &mut snapshot);
        assert_eq!(snapshot["description"].as_str().unwrap(), once);
    }
}
