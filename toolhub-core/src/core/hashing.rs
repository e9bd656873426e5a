// toolhub-core/src/core/hashing.rs
// ============================================================================
// Module: ToolHub Canonical Hashing
// Description: RFC 8785 JSON canonicalization and SHA-256 digests.
// Purpose: Provide deterministic hashes for idempotency keys and evidence.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! ToolHub hashes canonical JSON using RFC 8785 (JCS) so idempotency keys and
//! evidence hashes are stable across processes. The evidence hash for a tool
//! call is the SHA-256 over the concatenated request and response JSON bytes
//! exactly as persisted in the artifact store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes with SHA-256 and returns the lowercase hex digest.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Computes the evidence hash over concatenated request and response bytes.
#[must_use]
pub fn evidence_hash(request_json: &[u8], response_json: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request_json);
    hasher.update(response_json);
    hex_encode(&hasher.finalize())
}

/// Hashes a serializable value's canonical JSON with SHA-256.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let hi = usize::from(byte >> 4);
        let lo = usize::from(byte & 0x0f);
        out.push(char::from(HEX[hi]));
        out.push(char::from(HEX[lo]));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn evidence_hash_is_concatenation() {
        let joined = sha256_hex(b"{\"a\":1}{\"b\":2}");
        assert_eq!(evidence_hash(b"{\"a\":1}", b"{\"b\":2}"), joined);
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let value = serde_json::json!({"b": 1, "a": 2});
        let bytes = canonical_json_bytes(&value).unwrap();
        assert_eq!(bytes, b"{\"a\":2,\"b\":1}");
    }
}
