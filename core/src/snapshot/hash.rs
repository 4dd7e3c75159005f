//! Content hashing: 16 hex chars of SHA-256 over canonical bytes.

use sha2::{Digest, Sha256};

pub const HASH_LEN: usize = 16;

pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LEN);
    hex
}

/// Fingerprint over a set of object identities: the parts are sorted and
/// joined deterministically, so insertion order never matters and any single
/// change flips the result.
pub fn fingerprint<I>(parts: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut parts: Vec<String> = parts.into_iter().collect();
    parts.sort();
    content_hash(parts.join("\n").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_16_hex() {
        let h = content_hash(b"hello");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = fingerprint(["b".to_string(), "a".to_string()]);
        let b = fingerprint(["a".to_string(), "b".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_changes_on_any_part() {
        let a = fingerprint(["procedures:dbo.p:aaaa".to_string()]);
        let b = fingerprint(["procedures:dbo.p:aaab".to_string()]);
        assert_ne!(a, b);
    }
}
