//! XOR-metric key wrapper used to order peers by distance to a target.
//!
//! Mirrors the `kbucket::Key`/`Distance` pair the libp2p Kademlia
//! implementation uses, trimmed to just the XOR metric this crate needs.

use enr::NodeId;
use std::hash::Hash;

/// A `NodeId` viewed through the XOR metric. Keeps the original value
/// alongside so callers can recover it (`preimage`) after the key has
/// been used as a map key or compared for distance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key<T> {
    preimage: T,
    hash: [u8; 32],
}

impl<T> Key<T> {
    pub fn preimage(&self) -> &T {
        &self.preimage
    }
}

impl From<NodeId> for Key<NodeId> {
    fn from(node_id: NodeId) -> Self {
        let hash = node_id.raw();
        Key {
            preimage: node_id,
            hash,
        }
    }
}

impl Key<NodeId> {
    /// XOR distance between this key and another.
    pub fn distance(&self, other: &Key<NodeId>) -> Distance {
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = self.hash[i] ^ other.hash[i];
        }
        Distance(out)
    }
}

/// XOR distance between two `NodeId`s.
///
/// A plain big-endian byte array already orders correctly under the XOR
/// metric: lexicographic comparison of `[u8; 32]` is exactly unsigned
/// big-endian integer comparison, so no bignum type is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance(pub [u8; 32]);

/// Computes the XOR distance between two node ids directly, without
/// constructing `Key` wrappers.
pub fn distance(a: &NodeId, b: &NodeId) -> Distance {
    let a = a.raw();
    let b = b.raw();
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    Distance(out)
}
