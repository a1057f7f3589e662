//! Tag computation: binds a packet to the (sender, receiver) pair so the
//! receiver can recover the sender's `NodeId` without it being carried in
//! plaintext.
//!
//! `tag = src_node_id XOR sha256(dst_node_id)`, invertible by the receiver
//! who knows its own node id: `src_node_id = tag XOR sha256(local_node_id)`.

use enr::NodeId;
use sha2::{Digest, Sha256};

pub fn get_tag(src_node_id: &NodeId, dst_node_id: &NodeId) -> [u8; 32] {
    let hash = Sha256::digest(&dst_node_id.raw());
    xor(&src_node_id.raw(), &hash)
}

pub fn get_src_id(local_node_id: &NodeId, tag: &[u8; 32]) -> NodeId {
    let hash = Sha256::digest(&local_node_id.raw());
    NodeId::new(&xor(tag, &hash))
}

fn xor(a: &[u8; 32], b: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}
