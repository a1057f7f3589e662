//! Message codec: the application-level RPC carried inside an encrypted
//! `Packet`. External collaborator — the session service only ever
//! correlates on `ProtocolMessage::id`, never inspects `body`.

use enr::{CombinedKey, Enr};
use std::convert::TryInto;
use std::str::FromStr;

pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub id: RequestId,
    pub body: RpcType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcType {
    Request(Request),
    Response(Response),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping { enr_seq: u64 },
    FindNode { distance: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Pong { enr_seq: u64 },
    /// `total` is the number of NODES responses this FINDNODE will be split
    /// across (a single request may yield more ENRs than fit in one packet).
    Nodes { total: u64, nodes: Vec<Enr<CombinedKey>> },
}

#[derive(Debug, thiserror::Error)]
pub enum RpcDecodeError {
    #[error("message too short")]
    TooShort,
    #[error("unknown rpc type byte {0}")]
    UnknownType(u8),
    #[error("unknown request/response kind byte {0}")]
    UnknownKind(u8),
    #[error("malformed ENR list")]
    MalformedEnrList,
}

impl ProtocolMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.id.to_be_bytes().to_vec();
        match &self.body {
            RpcType::Request(Request::Ping { enr_seq }) => {
                out.push(0);
                out.push(0);
                out.extend_from_slice(&enr_seq.to_be_bytes());
            }
            RpcType::Request(Request::FindNode { distance }) => {
                out.push(0);
                out.push(1);
                out.extend_from_slice(&distance.to_be_bytes());
            }
            RpcType::Response(Response::Pong { enr_seq }) => {
                out.push(1);
                out.push(0);
                out.extend_from_slice(&enr_seq.to_be_bytes());
            }
            RpcType::Response(Response::Nodes { total, nodes }) => {
                out.push(1);
                out.push(1);
                out.extend_from_slice(&total.to_be_bytes());
                out.extend_from_slice(&(nodes.len() as u32).to_be_bytes());
                for enr in nodes {
                    let bytes = enr.to_base64().into_bytes();
                    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                    out.extend_from_slice(&bytes);
                }
            }
        }
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, RpcDecodeError> {
        if data.len() < 10 {
            return Err(RpcDecodeError::TooShort);
        }
        let id = u64::from_be_bytes(data[0..8].try_into().expect("checked length"));
        let rpc_type = data[8];
        let kind = data[9];
        let rest = &data[10..];
        let body = match rpc_type {
            0 => match kind {
                0 => RpcType::Request(Request::Ping {
                    enr_seq: take_u64(rest)?,
                }),
                1 => RpcType::Request(Request::FindNode {
                    distance: take_u64(rest)?,
                }),
                k => return Err(RpcDecodeError::UnknownKind(k)),
            },
            1 => match kind {
                0 => RpcType::Response(Response::Pong {
                    enr_seq: take_u64(rest)?,
                }),
                1 => {
                    if rest.len() < 12 {
                        return Err(RpcDecodeError::TooShort);
                    }
                    let total = u64::from_be_bytes(rest[0..8].try_into().unwrap());
                    let count = u32::from_be_bytes(rest[8..12].try_into().unwrap()) as usize;
                    let mut nodes = Vec::with_capacity(count);
                    let mut pos = 12;
                    for _ in 0..count {
                        if rest.len() < pos + 4 {
                            return Err(RpcDecodeError::TooShort);
                        }
                        let len = u32::from_be_bytes(rest[pos..pos + 4].try_into().unwrap()) as usize;
                        pos += 4;
                        if rest.len() < pos + len {
                            return Err(RpcDecodeError::TooShort);
                        }
                        let enr = enr_from_bytes(&rest[pos..pos + len])?;
                        nodes.push(enr);
                        pos += len;
                    }
                    RpcType::Response(Response::Nodes { total, nodes })
                }
                k => return Err(RpcDecodeError::UnknownKind(k)),
            },
            other => return Err(RpcDecodeError::UnknownType(other)),
        };
        Ok(ProtocolMessage { id, body })
    }
}

fn take_u64(data: &[u8]) -> Result<u64, RpcDecodeError> {
    if data.len() < 8 {
        return Err(RpcDecodeError::TooShort);
    }
    Ok(u64::from_be_bytes(data[0..8].try_into().expect("checked length")))
}

fn enr_from_bytes(data: &[u8]) -> Result<Enr<CombinedKey>, RpcDecodeError> {
    let text = std::str::from_utf8(data).map_err(|_| RpcDecodeError::MalformedEnrList)?;
    Enr::from_str(text).map_err(|_| RpcDecodeError::MalformedEnrList)
}
