//! Digest content fingerprint.

use sha2::{Digest, Sha256};

/// Hex width of a fingerprint. Short by contract: the fingerprint travels in
/// callback data and is the external digest-lookup key.
const FINGERPRINT_HEX_LEN: usize = 8;

/// Deterministic short identity for composed digest text.
///
/// This is an identity, not a security hash: 32 bits of SHA-256, rendered as
/// 8 lowercase hex characters. Collisions are possible but rare and accepted;
/// a colliding digest would update the earlier record in place.
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(FINGERPRINT_HEX_LEN);
    for byte in &digest[..FINGERPRINT_HEX_LEN / 2] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(fingerprint("digest text"), fingerprint("digest text"));
    }

    #[test]
    fn test_fingerprint_is_eight_lowercase_hex_chars() {
        let fp = fingerprint("some digest");
        assert_eq!(fp.len(), 8);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_different_text_changes_fingerprint() {
        assert_ne!(fingerprint("a"), fingerprint("b"));
    }
}
