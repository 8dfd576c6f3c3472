//! Secret encoding and per-value encryption
//!
//! Secret values live in two states:
//! - **encoded**: standard base64, as stored in a cluster Secret's `data`
//! - **encrypted**: an AES-256-GCM envelope around the encoded value, for
//!   keeping a copy outside the cluster (e.g., in version control)
//!
//! Encryption is per value. A document with some keys removed can still be
//! decrypted, and nothing in an envelope records which state it is in: the
//! caller tracks that.
//!
//! # Example
//!
//! ```
//! use deckhand_core::secrets::{decrypt_secret_values, encode_secret, encrypt_secret_values};
//! use std::collections::BTreeMap;
//!
//! let mut plain = BTreeMap::new();
//! plain.insert("password".to_string(), "hunter2".to_string());
//!
//! let secret = encode_secret("db", &plain);
//! let encrypted = encrypt_secret_values(&secret, "passphrase").unwrap();
//! let decrypted = decrypt_secret_values(&encrypted, "passphrase").unwrap();
//! assert_eq!(decrypted, secret);
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use serde_json::{Value as JsonValue, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// Key → value map of secret data, either all encoded or all encrypted
pub type SecretEnvelope = BTreeMap<String, String>;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// Base64-encode a plaintext string
pub fn encode_value(plain: &str) -> String {
    STANDARD.encode(plain.as_bytes())
}

/// Decode a base64 value back to plaintext
pub fn decode_value(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CoreError::crypto(format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| CoreError::crypto(format!("invalid UTF-8: {}", e)))
}

/// Build an Opaque Secret document with every value base64-encoded
pub fn encode_secret(name: &str, plain: &BTreeMap<String, String>) -> JsonValue {
    let data: serde_json::Map<String, JsonValue> = plain
        .iter()
        .map(|(k, v)| (k.clone(), JsonValue::String(encode_value(v))))
        .collect();

    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "Opaque",
        "metadata": { "name": name },
        "data": data,
    })
}

/// Decode every data value of a Secret document to plaintext
pub fn decode_secret(secret: &JsonValue) -> Result<BTreeMap<String, String>> {
    data_entries(secret)?
        .into_iter()
        .map(|(k, v)| decode_value(&v).map(|plain| (k, plain)))
        .collect()
}

/// Move `stringData` into `data`
///
/// Each `stringData` value is base64-encoded into `data`, replacing any
/// existing `data` entry with the same key, and `stringData` is removed.
/// Must run before encryption, which only looks at `data`.
pub fn promote_string_data(secret: &mut JsonValue) {
    let Some(obj) = secret.as_object_mut() else {
        return;
    };
    let Some(string_data) = obj.remove("stringData") else {
        return;
    };
    let JsonValue::Object(string_data) = string_data else {
        return;
    };
    if string_data.is_empty() {
        return;
    }

    let data = obj
        .entry("data")
        .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
    if !data.is_object() {
        *data = JsonValue::Object(serde_json::Map::new());
    }
    if let JsonValue::Object(data) = data {
        for (key, value) in string_data {
            let plain = match value {
                JsonValue::String(s) => s,
                other => other.to_string(),
            };
            data.insert(key, JsonValue::String(encode_value(&plain)));
        }
    }
}

/// Encrypt one value with a passphrase
///
/// The cipher key is the SHA-256 of the passphrase. Output is base64 of
/// `nonce || ciphertext`, with a fresh random nonce per call.
pub fn encrypt(value: &str, key: &str) -> Result<String> {
    let cipher = cipher_for(key)?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), value.as_bytes())
        .map_err(|e| CoreError::crypto(format!("encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

/// Decrypt one value produced by [`encrypt`]
pub fn decrypt(value: &str, key: &str) -> Result<String> {
    let cipher = cipher_for(key)?;

    let raw = STANDARD
        .decode(value)
        .map_err(|e| CoreError::crypto(format!("invalid ciphertext encoding: {}", e)))?;
    if raw.len() <= NONCE_LEN {
        return Err(CoreError::crypto("ciphertext too short"));
    }

    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    let plain = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CoreError::crypto("decryption failed (wrong key or corrupted value)"))?;

    String::from_utf8(plain).map_err(|e| CoreError::crypto(format!("invalid UTF-8: {}", e)))
}

fn cipher_for(key: &str) -> Result<Aes256Gcm> {
    let digest = Sha256::digest(key.as_bytes());
    Aes256Gcm::new_from_slice(&digest).map_err(|e| CoreError::crypto(e.to_string()))
}

/// Encrypt every value of an envelope
pub fn encrypt_values(envelope: &SecretEnvelope, key: &str) -> Result<SecretEnvelope> {
    envelope
        .iter()
        .map(|(k, v)| encrypt(v, key).map(|c| (k.clone(), c)))
        .collect()
}

/// Decrypt every value of an envelope
pub fn decrypt_values(envelope: &SecretEnvelope, key: &str) -> Result<SecretEnvelope> {
    envelope
        .iter()
        .map(|(k, v)| decrypt(v, key).map(|p| (k.clone(), p)))
        .collect()
}

/// Return a copy of a Secret document with every `data` value encrypted
///
/// `stringData` is promoted into `data` first, so no plaintext survives in
/// the copy.
pub fn encrypt_secret_values(secret: &JsonValue, key: &str) -> Result<JsonValue> {
    let mut promoted = secret.clone();
    promote_string_data(&mut promoted);
    transform_data(&promoted, |v| encrypt(v, key))
}

/// Return a copy of a Secret document with every `data` value decrypted
pub fn decrypt_secret_values(secret: &JsonValue, key: &str) -> Result<JsonValue> {
    transform_data(secret, |v| decrypt(v, key))
}

fn transform_data<F>(secret: &JsonValue, f: F) -> Result<JsonValue>
where
    F: Fn(&str) -> Result<String>,
{
    let entries = data_entries(secret)?;
    let mut out = secret.clone();
    if entries.is_empty() {
        return Ok(out);
    }

    let data: serde_json::Map<String, JsonValue> = entries
        .into_iter()
        .map(|(k, v)| f(&v).map(|t| (k, JsonValue::String(t))))
        .collect::<Result<_>>()?;
    out["data"] = JsonValue::Object(data);
    Ok(out)
}

fn data_entries(secret: &JsonValue) -> Result<SecretEnvelope> {
    match secret.get("data") {
        None | Some(JsonValue::Null) => Ok(SecretEnvelope::new()),
        Some(JsonValue::Object(data)) => data
            .iter()
            .map(|(k, v)| match v {
                JsonValue::String(s) => Ok((k.clone(), s.clone())),
                other => Err(CoreError::crypto(format!(
                    "secret data '{}' is not a string: {}",
                    k, other
                ))),
            })
            .collect(),
        Some(other) => Err(CoreError::crypto(format!(
            "secret data is not a map: {}",
            other
        ))),
    }
}
