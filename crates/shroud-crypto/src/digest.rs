//! MD5 digest and password key derivation.
//!
//! MD5 is kept for compatibility with the established method key schedule
//! only. It is never used for integrity: AEAD tags cover that.

use md5::{Digest, Md5};

/// MD5 output size.
pub const DIGEST_SIZE: usize = 16;

/// Compute the MD5 digest of `input` into caller-supplied storage.
///
/// Returns `out` for chaining.
pub fn digest<'a>(input: &[u8], out: &'a mut [u8; DIGEST_SIZE]) -> &'a mut [u8; DIGEST_SIZE] {
    out.copy_from_slice(&Md5::digest(input));
    out
}

/// Derive a master key from a password.
///
/// `D_0 = MD5(password)`, `D_i = MD5(D_{i-1} || password)`, and the key is
/// `D_0 || D_1 || ...` truncated to `key.len()`. This matches the OpenSSL
/// `EVP_BytesToKey` schedule with one iteration and no salt.
pub fn bytes_to_key(password: &[u8], key: &mut [u8]) {
    let mut prev = [0u8; DIGEST_SIZE];
    let mut offset = 0;

    while offset < key.len() {
        let mut hasher = Md5::new();
        if offset > 0 {
            hasher.update(prev);
        }
        hasher.update(password);
        prev.copy_from_slice(&hasher.finalize());

        let take = DIGEST_SIZE.min(key.len() - offset);
        key[offset..offset + take].copy_from_slice(&prev[..take]);
        offset += take;
    }
}

/// Log `data` as hex at trace level.
pub fn dump(tag: &str, data: &[u8]) {
    tracing::trace!(tag, len = data.len(), bytes = %hex::encode(data), "dump");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vectors() {
        // RFC 1321 test suite
        let mut out = [0u8; DIGEST_SIZE];
        assert_eq!(
            hex::encode(digest(b"", &mut out)),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            hex::encode(digest(b"abc", &mut out)),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            hex::encode(digest(b"message digest", &mut out)),
            "f96b697d7cb7938d525a2f31aaf161d0"
        );
    }

    #[test]
    fn test_digest_returns_caller_storage() {
        let mut a = [0u8; DIGEST_SIZE];
        let mut b = [0u8; DIGEST_SIZE];
        digest(b"one", &mut a);
        digest(b"two", &mut b);
        // Separate storage, no shared state between calls
        assert_ne!(a, b);
    }

    #[test]
    fn test_bytes_to_key_first_block_is_md5() {
        let mut key = [0u8; 32];
        bytes_to_key(b"pw123", &mut key);

        let mut first = [0u8; DIGEST_SIZE];
        digest(b"pw123", &mut first);
        assert_eq!(&key[..16], &first);

        let mut chained = Vec::from(first);
        chained.extend_from_slice(b"pw123");
        let mut second = [0u8; DIGEST_SIZE];
        digest(&chained, &mut second);
        assert_eq!(&key[16..], &second);
    }

    #[test]
    fn test_bytes_to_key_truncates() {
        let mut short = [0u8; 24];
        let mut long = [0u8; 32];
        bytes_to_key(b"password", &mut short);
        bytes_to_key(b"password", &mut long);
        assert_eq!(short, long[..24]);
    }

    #[test]
    fn test_bytes_to_key_deterministic() {
        let mut k1 = [0u8; 32];
        let mut k2 = [0u8; 32];
        let mut k3 = [0u8; 32];
        bytes_to_key(b"alpha", &mut k1);
        bytes_to_key(b"alpha", &mut k2);
        bytes_to_key(b"beta", &mut k3);
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }
}
