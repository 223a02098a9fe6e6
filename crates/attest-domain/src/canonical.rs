//! Canonical JSON and content hashing
//!
//! Identifiers for evidence, defeaters and contradictions are blake3 digests
//! of a canonical JSON rendering: object keys sorted, no whitespace. Each
//! identifier family hashes under its own domain tag so equal content in two
//! families never collides.

use serde_json::Value;

/// Domain tag for evidence entry identifiers
pub const EVIDENCE_DOMAIN: &str = "attest.evidence.v1";
/// Domain tag for defeater identifiers
pub const DEFEATER_DOMAIN: &str = "attest.defeater.v1";
/// Domain tag for contradiction identifiers
pub const CONTRADICTION_DOMAIN: &str = "attest.contradiction.v1";

/// Render `value` with object keys sorted recursively
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
                // Strings serialize infallibly
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
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

/// Hex blake3 digest of the canonical rendering under a domain tag
pub fn content_hash(domain: &str, value: &Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(canonical_json(value).as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Hex blake3 digest of string parts under a domain tag
///
/// Parts are length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn parts_hash(domain: &str, parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(&[0u8]);
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Whether `s` looks like a hex digest produced by this module
pub fn is_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
