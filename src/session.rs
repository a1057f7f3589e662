//! Per-peer session state machine.

use crate::crypto::{SessionKey, ID_NONCE_LENGTH};
use enr::{CombinedKey, Enr, NodeId};
use libsecp256k1::{PublicKey, SecretKey};
use std::net::SocketAddr;

/// Handshake scratch kept only while a session is in a pre-established
/// state; cleared once the handshake completes.
#[derive(Debug, Clone)]
pub struct HandshakeScratch {
    pub id_nonce: [u8; ID_NONCE_LENGTH],
    pub ephemeral_secret: Option<SecretKey>,
    pub ephemeral_public: Option<PublicKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// We sent a WHOAREYOU challenge and await the peer's AuthMessage.
    WhoAreYouSent,
    /// We initiated contact with a Random packet and await their WHOAREYOU.
    RandomSent,
    /// Keys are derived but not yet confirmed by a successful decrypt.
    AwaitingResponse,
    /// Keys are confirmed; the session may still be untrusted.
    Established,
}

pub struct Session {
    pub state: SessionState,
    /// Key used to encrypt packets we send to the peer.
    pub outbound_key: Option<SessionKey>,
    /// Key used to decrypt packets the peer sends to us.
    pub inbound_key: Option<SessionKey>,
    pub remote_node_id: NodeId,
    pub remote_enr: Option<Enr<CombinedKey>>,
    pub last_seen_multiaddr: Option<SocketAddr>,
    pub trusted: bool,
    pub handshake: Option<HandshakeScratch>,
}

impl Session {
    pub fn new_random_sent(remote_node_id: NodeId) -> Self {
        Session {
            state: SessionState::RandomSent,
            outbound_key: None,
            inbound_key: None,
            remote_node_id,
            remote_enr: None,
            last_seen_multiaddr: None,
            trusted: false,
            handshake: None,
        }
    }

    pub fn new_who_are_you_sent(remote_node_id: NodeId, id_nonce: [u8; ID_NONCE_LENGTH]) -> Self {
        Session {
            state: SessionState::WhoAreYouSent,
            outbound_key: None,
            inbound_key: None,
            remote_node_id,
            remote_enr: None,
            last_seen_multiaddr: None,
            trusted: false,
            handshake: Some(HandshakeScratch {
                id_nonce,
                ephemeral_secret: None,
                ephemeral_public: None,
            }),
        }
    }

    /// Re-evaluates the trust invariant: a session is trusted iff the
    /// cached remote ENR's UDP endpoint matches the last observed source
    /// address.
    pub fn update_trust(&mut self) -> bool {
        let was_trusted = self.trusted;
        self.trusted = match (&self.remote_enr, self.last_seen_multiaddr) {
            (Some(enr), Some(addr)) => enr.udp_socket() == Some(addr),
            _ => false,
        };
        self.trusted != was_trusted
    }

    pub fn is_trusted_established(&self) -> bool {
        self.state == SessionState::Established && self.trusted
    }
}
