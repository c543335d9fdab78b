//! Field-level encryption for sensitive text fields.
//!
//! Encryption is applied field-by-field to a per-entity allowlist, never to
//! whole records, so non-sensitive fields stay queryable without decryption.
//! Ciphertext carries the `enc:v2:` marker prefix; `decrypt` is the identity
//! on unmarked text, which keeps records written before encryption was
//! introduced readable.

mod codec;
mod fields;

pub use codec::{CryptoError, FieldCodec, ENC_MARKER};
pub use fields::sensitive_fields;
