//! Error taxonomy for the session service and lookup engine.
//!
//! Only the configuration and usage categories from the design surface
//! as `Result`s; transient-network, cryptographic, and protocol-violation
//! failures are handled internally (logged, session dropped, packet
//! dropped) and are never returned from here — see the `requestFailed`
//! and `whoAreYouRequest` events instead.

use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The local keypair does not match the local ENR's public key.
    #[error("local keypair does not match the local ENR")]
    KeypairEnrMismatch,

    /// Binding the UDP transport failed.
    #[error("failed to bind UDP socket on {addr}: {source}")]
    SocketBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `sendRequest`/`sendRequestUnknownEnr` attempted on a peer with no session and no
    /// usable endpoint to start one.
    #[error("no known endpoint for peer, cannot start a session")]
    NoKnownAddress,

    /// `sendRequest` on a session that has not completed the handshake.
    #[error("session with peer is not yet established")]
    SessionNotReady,

    /// `sendRequest` on an established session whose peer is not trusted.
    #[error("session with peer is established but untrusted")]
    UntrustedPeer,

    /// `sendRequestUnknownEnr`/`sendResponse` with no existing session for the peer.
    #[error("no session exists for peer")]
    NoSession,

    /// The outbound send queue rejected the packet (transport error surfaced synchronously).
    #[error("failed to hand packet to transport: {0}")]
    Transport(#[from] std::io::Error),
}
