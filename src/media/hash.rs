/// Content identity for canonical bytes
use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of canonical bytes as lowercase hex.
///
/// The digest doubles as the dedup key and the storage address, so it
/// must be computed over canonical (post-transcode) bytes, never the raw
/// upload.
pub fn content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_bytes_identical_hash() {
        let a = b"canonical bytes".to_vec();
        let b = a.clone();
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_known_digest() {
        // SHA-256("abc")
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_is_lowercase_hex() {
        let digest = content_hash(b"");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
