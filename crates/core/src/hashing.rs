//! Hex digests used for report checksums.
//!
//! Reports advertise an MD5 sum for clients and a SHA-256 checksum as a
//! stronger secondary check.

use md5::Md5;
use sha2::{Digest, Sha256};

/// Compute a lowercase SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute a lowercase MD5 hex digest of the given bytes.
pub fn md5_hex(data: &[u8]) -> String {
    let hash = Md5::digest(data);
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn md5_of_known_inputs() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(sha256_hex(b"report-a"), sha256_hex(b"report-b"));
        assert_eq!(sha256_hex(b"hello world").len(), 64);
    }
}
