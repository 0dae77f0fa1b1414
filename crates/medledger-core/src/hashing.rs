//! Deterministic content hashing.
//!
//! Audit rows never store request or response bodies, only their SHA-256 over a
//! canonical form. Structured payloads are canonicalised by sorting object keys
//! recursively and emitting compact JSON, so two payloads that differ only in
//! key insertion order hash identically.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// A payload handed to the audit subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No payload. Hashes as the empty string.
    Null,
    /// Free text, hashed as its UTF-8 bytes.
    Text(String),
    /// Opaque bytes, hashed as-is.
    Bytes(Vec<u8>),
    /// Structured data, hashed over its canonical JSON form.
    Json(Value),
}

impl Payload {
    /// The exact bytes that get hashed.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Null => Vec::new(),
            Payload::Text(text) => text.as_bytes().to_vec(),
            Payload::Bytes(bytes) => bytes.clone(),
            Payload::Json(value) => canonical_json(value).into_bytes(),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Null,
            Value::String(text) => Payload::Text(text),
            other => Payload::Json(other),
        }
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Payload::Null)
    }
}

/// Compute the 64-character hex SHA-256 of a payload.
pub fn hash_payload(payload: &Payload) -> String {
    sha256_hex(&payload.canonical_bytes())
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Serialize a JSON value with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
