//! Content digests over complete artifact blobs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest algorithms accepted for artifact verification. Both produce 256-bit digests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// Used for constraint systems.
    Sha256,
    /// Used for the shared SRS files.
    #[default]
    Blake3,
}

impl DigestAlgorithm {
    /// Hex digest of the whole blob.
    pub fn compute(&self, bytes: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
            DigestAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        }
    }

}

/// Compares a computed hex digest against a configured one, ignoring case and
/// surrounding whitespace.
pub fn digests_match(actual_hex: &str, expected_hex: &str) -> bool {
    actual_hex.eq_ignore_ascii_case(expected_hex.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            DigestAlgorithm::Sha256.compute(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn comparison_ignores_case_and_padding() {
        let data = b"powers of tau";
        let blake = DigestAlgorithm::Blake3.compute(data);
        assert!(digests_match(&blake, &format!(" {}\n", blake.to_uppercase())));
        assert!(!digests_match(&DigestAlgorithm::Sha256.compute(data), &blake));
        assert!(!digests_match(
            &DigestAlgorithm::Blake3.compute(b"powers of ta"),
            &blake
        ));
    }
}
