//! Packet codec: the four discv5 packet kinds, plus a minimal concrete
//! wire encoding for them.
//!
//! This is an external collaborator — the session service only needs the
//! shapes below, never their exact bytes — so the codec here favors
//! simplicity (length-prefixed fields, an explicit kind byte) over
//! matching the real discv5 wire format bit-for-bit.

use crate::crypto::{AUTH_TAG_LENGTH, ID_NONCE_LENGTH};
use sha2::{Digest, Sha256};
use std::convert::TryInto;

pub const MAGIC_LENGTH: usize = 32;

/// Derives the WHOAREYOU magic value for a destination node id, used by
/// the transport to recognise a WHOAREYOU packet addressed to us.
pub fn whoareyou_magic(dest_node_id: &enr::NodeId) -> [u8; MAGIC_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(&dest_node_id.raw());
    hasher.update(b"WHOAREYOU");
    let mut out = [0u8; MAGIC_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub auth_tag: [u8; AUTH_TAG_LENGTH],
    pub id_nonce: [u8; ID_NONCE_LENGTH],
    pub auth_scheme_name: String,
    pub ephemeral_pubkey: Vec<u8>,
    /// Encrypted `{ signature(id_nonce), enr? }`.
    pub auth_response: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// First packet of a handshake: opaque random bytes, tagged, no session keys yet.
    Random {
        tag: [u8; 32],
        auth_tag: [u8; AUTH_TAG_LENGTH],
        random_data: Vec<u8>,
    },
    /// Challenge issued in response to an unrecognised packet.
    WhoAreYou {
        /// The auth tag of the packet being challenged.
        token: [u8; AUTH_TAG_LENGTH],
        id_nonce: [u8; ID_NONCE_LENGTH],
        enr_seq: u64,
    },
    /// Completes a handshake: carries the auth header and the first encrypted message.
    AuthMessage {
        tag: [u8; 32],
        auth_header: AuthHeader,
        message: Vec<u8>,
    },
    /// A message on an already-established session.
    Message {
        tag: [u8; 32],
        auth_tag: [u8; AUTH_TAG_LENGTH],
        message: Vec<u8>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("packet too short")]
    TooShort,
    #[error("unknown packet kind byte {0}")]
    UnknownKind(u8),
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Packet::Random {
                tag,
                auth_tag,
                random_data,
            } => {
                out.push(0);
                out.extend_from_slice(tag);
                out.extend_from_slice(auth_tag);
                write_bytes(&mut out, random_data);
            }
            Packet::WhoAreYou {
                token,
                id_nonce,
                enr_seq,
            } => {
                out.push(1);
                out.extend_from_slice(token);
                out.extend_from_slice(id_nonce);
                out.extend_from_slice(&enr_seq.to_be_bytes());
            }
            Packet::AuthMessage {
                tag,
                auth_header,
                message,
            } => {
                out.push(2);
                out.extend_from_slice(tag);
                out.extend_from_slice(&auth_header.auth_tag);
                out.extend_from_slice(&auth_header.id_nonce);
                write_bytes(&mut out, auth_header.auth_scheme_name.as_bytes());
                write_bytes(&mut out, &auth_header.ephemeral_pubkey);
                write_bytes(&mut out, &auth_header.auth_response);
                write_bytes(&mut out, message);
            }
            Packet::Message {
                tag,
                auth_tag,
                message,
            } => {
                out.push(3);
                out.extend_from_slice(tag);
                out.extend_from_slice(auth_tag);
                write_bytes(&mut out, message);
            }
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::TooShort);
        }
        let kind = data[0];
        let mut cursor = Cursor::new(&data[1..]);
        match kind {
            0 => {
                let tag = cursor.take_array::<32>()?;
                let auth_tag = cursor.take_array::<AUTH_TAG_LENGTH>()?;
                let random_data = cursor.take_bytes()?;
                Ok(Packet::Random {
                    tag,
                    auth_tag,
                    random_data,
                })
            }
            1 => {
                let token = cursor.take_array::<AUTH_TAG_LENGTH>()?;
                let id_nonce = cursor.take_array::<ID_NONCE_LENGTH>()?;
                let enr_seq = cursor.take_u64()?;
                Ok(Packet::WhoAreYou {
                    token,
                    id_nonce,
                    enr_seq,
                })
            }
            2 => {
                let tag = cursor.take_array::<32>()?;
                let auth_tag = cursor.take_array::<AUTH_TAG_LENGTH>()?;
                let id_nonce = cursor.take_array::<ID_NONCE_LENGTH>()?;
                let auth_scheme_name =
                    String::from_utf8_lossy(&cursor.take_bytes()?).into_owned();
                let ephemeral_pubkey = cursor.take_bytes()?;
                let auth_response = cursor.take_bytes()?;
                let message = cursor.take_bytes()?;
                Ok(Packet::AuthMessage {
                    tag,
                    auth_header: AuthHeader {
                        auth_tag,
                        id_nonce,
                        auth_scheme_name,
                        ephemeral_pubkey,
                        auth_response,
                    },
                    message,
                })
            }
            3 => {
                let tag = cursor.take_array::<32>()?;
                let auth_tag = cursor.take_array::<AUTH_TAG_LENGTH>()?;
                let message = cursor.take_bytes()?;
                Ok(Packet::Message {
                    tag,
                    auth_tag,
                    message,
                })
            }
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        if self.data.len() < self.pos + N {
            return Err(DecodeError::TooShort);
        }
        let slice = &self.data[self.pos..self.pos + N];
        self.pos += N;
        Ok(slice.try_into().expect("length checked above"))
    }

    fn take_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take_array::<8>()?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn take_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len_bytes = self.take_array::<2>()?;
        let len = u16::from_be_bytes(len_bytes) as usize;
        if self.data.len() < self.pos + len {
            return Err(DecodeError::TooShort);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice.to_vec())
    }
}
