//! SHA-256 fingerprints for jobs and other wire content

use crate::encoding;
use sha2::{Digest, Sha256};

/// SHA-256 of `data`
pub fn digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 of `data` as 64 lowercase hex characters
pub fn digest_hex(data: &[u8]) -> String {
    encoding::encode(&digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(
            digest_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_abc() {
        assert_eq!(
            digest_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_two_block_message() {
        assert_eq!(
            digest_hex(b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq"),
            "248d6a61d20638b8e5c026930c3e6039a33ce45964ff2167f6ecedd419db06c1"
        );
    }

    #[test]
    fn test_concurrent_callers_agree() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| digest_hex(b"abc")))
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), digest_hex(b"abc"));
        }
    }
}
