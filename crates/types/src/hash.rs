//! 32-byte content hash used for blocks, votes, and randomness seeds.

use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte SHA-256 digest.
///
/// Used as block hash, node identity, and common random seed. The inner
/// bytes are public so callers can build deterministic fixtures.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hash a single byte slice.
    pub fn digest(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Hash(hasher.finalize().into())
    }

    /// Hash the concatenation of several byte slices.
    pub fn digest_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Hash(hasher.finalize().into())
    }

    /// Raw bytes of the digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps structured log lines readable.
        write!(
            f,
            "Hash({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = Hash::digest(b"manifold");
        let b = Hash::digest(b"manifold");
        assert_eq!(a, b);
        assert_ne!(a, Hash::digest(b"manifolD"));
    }

    #[test]
    fn digest_parts_matches_concatenation() {
        let joined = Hash::digest(b"roundchain");
        let parts = Hash::digest_parts(&[b"round", b"chain"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn display_is_full_hex() {
        let h = Hash::ZERO;
        assert_eq!(h.to_string().len(), 64);
        assert!(h.to_string().chars().all(|c| c == '0'));
    }
}
