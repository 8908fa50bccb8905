//! Hashing functions using BLAKE3 (with SHA-256 selectable)

use sha2::{Digest, Sha256};
use tessera_core::{Hash, HashAlgorithm};

/// Compute BLAKE3 hash of data
pub fn blake3_hash(data: &[u8]) -> Hash {
    let hash = blake3::hash(data);
    Hash::from_bytes(*hash.as_bytes())
}

/// Compute SHA-256 hash of data
pub fn sha256_hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash::from_bytes(bytes)
}

/// Default hash function (BLAKE3)
pub fn hash(data: &[u8]) -> Hash {
    blake3_hash(data)
}

/// Commitment to a key/value pair.
///
/// The key length is mixed in first so that `("ab", "c")` and `("a", "bc")`
/// commit to different values.
pub fn commitment(algorithm: HashAlgorithm, key: &[u8], value: &[u8]) -> Hash {
    let mut hasher = IncrementalHasher::with_algorithm(algorithm);
    hasher.update(&(key.len() as u64).to_be_bytes());
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

enum HasherState {
    Blake3(blake3::Hasher),
    Sha256(Sha256),
}

/// Incremental hasher for large or streamed data
pub struct IncrementalHasher {
    state: HasherState,
}

impl IncrementalHasher {
    pub fn new() -> Self {
        Self::with_algorithm(HashAlgorithm::Blake3)
    }

    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Blake3 => HasherState::Blake3(blake3::Hasher::new()),
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
        };
        Self { state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Blake3(h) => {
                h.update(data);
            }
            HasherState::Sha256(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Hash {
        match self.state {
            HasherState::Blake3(h) => Hash::from_bytes(*h.finalize().as_bytes()),
            HasherState::Sha256(h) => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&h.finalize());
                Hash::from_bytes(bytes)
            }
        }
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_hash() {
        let data = b"Hello, tessera!";
        let hash1 = blake3_hash(data);
        let hash2 = blake3_hash(data);

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, Hash::ZERO);
    }

    #[test]
    fn test_different_hashes() {
        let data = b"Hello, tessera!";
        assert_ne!(blake3_hash(data), sha256_hash(data));
    }

    #[test]
    fn test_incremental_hasher() {
        let mut hasher = IncrementalHasher::new();
        hasher.update(b"Hello, ");
        hasher.update(b"tessera!");
        assert_eq!(hasher.finalize(), hash(b"Hello, tessera!"));

        let mut hasher = IncrementalHasher::with_algorithm(HashAlgorithm::Sha256);
        hasher.update(b"Hello, ");
        hasher.update(b"tessera!");
        assert_eq!(hasher.finalize(), sha256_hash(b"Hello, tessera!"));
    }

    #[test]
    fn test_commitment_is_boundary_sensitive() {
        let a = commitment(HashAlgorithm::Blake3, b"ab", b"c");
        let b = commitment(HashAlgorithm::Blake3, b"a", b"bc");
        assert_ne!(a, b);
        assert_eq!(a, commitment(HashAlgorithm::Blake3, b"ab", b"c"));
        assert_ne!(a, commitment(HashAlgorithm::Sha256, b"ab", b"c"));
    }
}
