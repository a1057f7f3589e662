//! Session Service and Iterative Lookup Engine for discv5 peer discovery.
//!
//! The crate is split into the handshake/session layer
//! ([`session_service`], built on [`session`], [`session_store`],
//! [`pending_requests`] and the transport in [`service`]) and the
//! Kademlia-style lookup engine ([`lookup`]), which drives FINDNODE
//! queries over whatever session layer it is given.

pub mod config;
pub mod crypto;
pub mod error;
pub mod key;
pub mod lookup;
pub mod packet;
pub mod pending_requests;
pub mod rpc;
pub mod service;
pub mod session;
pub mod session_service;
pub mod session_store;
pub mod tag;

pub use config::Discv5Config;
pub use error::{Error, Result};
pub use lookup::{Lookup, LookupConfig, LookupEvent, LookupPeerState, LookupProgress};
pub use rpc::{ProtocolMessage, Request, Response, RpcType};
pub use session_service::{SessionEvent, SessionService};
