//! Content digests and storage keys.

use sha2::{Digest, Sha256};

/// SHA-256 digest of fetched content, hex encoded.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Storage key for a (session, url) pair.
pub fn entry_key(session: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stability() {
        assert_eq!(content_hash(b"<html>a</html>"), content_hash(b"<html>a</html>"));
        assert_ne!(content_hash(b"<html>a</html>"), content_hash(b"<html>b</html>"));
    }

    #[test]
    fn test_content_hash_known_value() {
        assert_eq!(content_hash(b""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn test_entry_key_scoped_by_session() {
        let a = entry_key("user_123", "https://example.com/");
        let b = entry_key("user_456", "https://example.com/");
        assert_ne!(a, b);
        assert_eq!(a, entry_key("user_123", "https://example.com/"));
    }

    #[test]
    fn test_entry_key_no_separator_collision() {
        assert_ne!(entry_key("a", "bc"), entry_key("ab", "c"));
    }

    #[test]
    fn test_hash_format() {
        let hash = entry_key("default", "https://example.com/");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
