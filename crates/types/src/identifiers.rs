//! Node identity and per-round randomness identifiers.

use crate::Hash;
use std::fmt;

/// Identity of a consensus node, derived from its public key digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub Hash);

impl NodeId {
    /// Raw digest bytes of the identity.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.as_bytes();
        write!(f, "NodeId({:02x}{:02x}{:02x}{:02x}…)", b[0], b[1], b[2], b[3])
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Common random seed, one per round. Drives notary-subset selection and
/// leader election targets.
pub type Crs = Hash;
