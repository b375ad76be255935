// Hashing and signing primitives.
//
// API key secrets are stored as base64url-encoded SHA-256 digests; access
// codes as hex digests. Webhook payloads and widget tokens are signed with
// HMAC-SHA256, hex-encoded. All comparisons against stored or transmitted
// values are constant-time.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use firstuser_connect_core::error::{ConnectError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Hash an API key secret: SHA-256, base64url without padding.
pub fn hash_secret(secret: &str) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    let hash = Sha256::digest(secret.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// SHA-256 hex digest, used for access code hashes.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// HMAC-SHA256 signature over `value`, hex-encoded.
pub fn make_signature(value: &[u8], secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ConnectError::Crypto(format!("HMAC init failed: {e}")))?;
    mac.update(value);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify an HMAC-SHA256 hex signature in constant time.
pub fn verify_signature(value: &[u8], secret: &str, signature: &str) -> Result<bool> {
    let expected = make_signature(value, secret)?;
    Ok(constant_time_equal(expected.as_bytes(), signature.as_bytes()))
}

/// Compare two byte slices in constant time.
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_secret_deterministic_base64url() {
        let h1 = hash_secret("sk_secret_value");
        let h2 = hash_secret("sk_secret_value");
        assert_eq!(h1, h2);
        assert!(!h1.contains('+'));
        assert!(!h1.contains('/'));
        assert!(!h1.contains('='));
    }

    #[test]
    fn test_sha256_hex_length() {
        let h = sha256_hex("one-time-code");
        assert_eq!(h.len(), 64);
        assert_eq!(h, sha256_hex("one-time-code"));
        assert_ne!(h, sha256_hex("another-code"));
    }

    #[test]
    fn test_make_signature_hex() {
        let sig = make_signature(b"{\"type\":\"access.granted\"}", "whsec_1").unwrap();
        // Hex-encoded HMAC-SHA256 is always 64 chars
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_signature() {
        let body = b"{\"type\":\"plan.updated\",\"data\":{}}";
        let sig = make_signature(body, "secret").unwrap();
        assert!(verify_signature(body, "secret", &sig).unwrap());
        assert!(!verify_signature(body, "wrong-secret", &sig).unwrap());
        assert!(!verify_signature(b"tampered", "secret", &sig).unwrap());
    }

    #[test]
    fn test_single_byte_tamper_invalidates() {
        let body = b"{\"type\":\"access.granted\",\"data\":{\"x\":1}}".to_vec();
        let sig = make_signature(&body, "secret").unwrap();
        let mut tampered = body.clone();
        tampered[10] ^= 1;
        assert!(!verify_signature(&tampered, "secret", &sig).unwrap());
    }

    #[test]
    fn test_constant_time_equal() {
        assert!(constant_time_equal(b"abc", b"abc"));
        assert!(!constant_time_equal(b"abc", b"abd"));
        assert!(!constant_time_equal(b"abc", b"ab"));
    }
}
