//! Pending Request Table: a two-level `Multiaddr -> RequestId ->
//! PendingRequest` map with a per-entry retransmission timeout.
//!
//! Keyed by destination address rather than destination node id because
//! a WHOAREYOU reply carries no source node id and must be correlated by
//! source address alone. Request id `0` is reserved for the handshake
//! packets (`Random`, `WhoAreYou`) that carry no application message, so
//! at most one handshake packet can be outstanding per address at a time
//! — this is what gives "at most one outbound Random packet" its
//! guarantee, not extra bookkeeping.
//!
//! Built on the `session_service/timed_sessions.rs` (`TimedSessions`)
//! pattern, generalized to a two-level map with a composite
//! `(SocketAddr, RequestId)` delay-queue key.

use crate::packet::Packet;
use crate::rpc::{ProtocolMessage, RequestId};
use core::pin::Pin;
use enr::NodeId;
use futures::Stream;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{delay_queue, DelayQueue};

/// Request id reserved for handshake packets (`Random`, `WhoAreYou`) that
/// carry no application message.
pub const HANDSHAKE_REQUEST_ID: RequestId = 0;

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub dst_id: NodeId,
    pub dst: SocketAddr,
    pub packet: Packet,
    pub message: Option<ProtocolMessage>,
    pub retries: u8,
}

impl PendingRequest {
    /// True for the two handshake packet kinds that have no embedded
    /// application message and so cannot be retried as ordinary RPCs —
    /// their exhaustion means the handshake itself failed.
    pub fn is_handshake_packet(&self) -> bool {
        matches!(self.packet, Packet::Random { .. } | Packet::WhoAreYou { .. })
    }

    /// The auth tag this packet carries, if any — used to correlate an
    /// inbound WHOAREYOU's `token` against the outgoing packet it challenges.
    pub fn auth_tag(&self) -> Option<[u8; crate::crypto::AUTH_TAG_LENGTH]> {
        match &self.packet {
            Packet::Random { auth_tag, .. } | Packet::Message { auth_tag, .. } => {
                Some(*auth_tag)
            }
            Packet::WhoAreYou { .. } | Packet::AuthMessage { .. } => None,
        }
    }
}

pub struct PendingRequestTable {
    requests: HashMap<SocketAddr, HashMap<RequestId, (PendingRequest, delay_queue::Key)>>,
    timeouts: DelayQueue<(SocketAddr, RequestId)>,
    request_timeout: Duration,
}

impl PendingRequestTable {
    pub fn new(request_timeout: Duration) -> Self {
        PendingRequestTable {
            requests: HashMap::new(),
            timeouts: DelayQueue::new(),
            request_timeout,
        }
    }

    pub fn insert(&mut self, dst: SocketAddr, request_id: RequestId, request: PendingRequest) {
        let key = self.timeouts.insert((dst, request_id), self.request_timeout);
        self.requests
            .entry(dst)
            .or_insert_with(HashMap::new)
            .insert(request_id, (request, key));
    }

    pub fn get(&self, dst: &SocketAddr, request_id: RequestId) -> Option<&PendingRequest> {
        self.requests
            .get(dst)
            .and_then(|inner| inner.get(&request_id))
            .map(|(req, _)| req)
    }

    pub fn remove(&mut self, dst: &SocketAddr, request_id: RequestId) -> Option<PendingRequest> {
        let inner = self.requests.get_mut(dst)?;
        let (request, key) = inner.remove(&request_id)?;
        self.timeouts.remove(&key);
        if inner.is_empty() {
            self.requests.remove(dst);
        }
        Some(request)
    }

    /// Re-arms a request's timeout after a retransmission, without
    /// removing and re-inserting (which would lose the entry's identity
    /// for concurrent lookups).
    pub fn rearm(&mut self, dst: &SocketAddr, request_id: RequestId) {
        if let Some(inner) = self.requests.get_mut(dst) {
            if let Some((_, key)) = inner.get(&request_id) {
                self.timeouts.reset(key, self.request_timeout);
            }
        }
    }

    /// Increments the retry counter for a request, returning the new
    /// count, or `None` if the request is no longer tracked.
    pub fn bump_retries(&mut self, dst: &SocketAddr, request_id: RequestId) -> Option<u8> {
        let inner = self.requests.get_mut(dst)?;
        let (request, _) = inner.get_mut(&request_id)?;
        request.retries += 1;
        Some(request.retries)
    }

    /// Whether any request is outstanding for `node_id`, across every
    /// address it might be reachable at. O(total pending), as this is
    /// only consulted on a session-timeout tick, not the hot path.
    pub fn requests_outstanding_for(&self, node_id: &NodeId) -> bool {
        self.requests
            .values()
            .any(|inner| inner.values().any(|(req, _)| &req.dst_id == node_id))
    }

    /// Scans the requests outstanding at `addr` for one whose auth tag
    /// matches `token` — the correlation an inbound WHOAREYOU requires.
    /// O(pending for that address).
    pub fn find_by_token(
        &self,
        addr: &SocketAddr,
        token: &[u8; crate::crypto::AUTH_TAG_LENGTH],
    ) -> Option<RequestId> {
        let inner = self.requests.get(addr)?;
        inner.iter().find_map(|(request_id, (req, _))| {
            if req.auth_tag().as_ref() == Some(token) {
                Some(*request_id)
            } else {
                None
            }
        })
    }

    /// Finds the pending `WhoAreYou` request addressed to `src_id` at
    /// `addr` — the correlation `onAuthMessage` requires.
    pub fn find_who_are_you(&self, addr: &SocketAddr, src_id: &NodeId) -> Option<RequestId> {
        let inner = self.requests.get(addr)?;
        inner.iter().find_map(|(request_id, (req, _))| {
            if matches!(req.packet, Packet::WhoAreYou { .. }) && &req.dst_id == src_id {
                Some(*request_id)
            } else {
                None
            }
        })
    }
}

impl Stream for PendingRequestTable {
    /// `(dst, request_id)` of a request whose retransmission timer fired.
    /// The table does not remove or retry it automatically — the caller
    /// (`SessionService`) applies the retry/abandon policy, which needs
    /// transport access this table does not have.
    type Item = (SocketAddr, RequestId);

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let table = self.get_mut();
        match Pin::new(&mut table.timeouts).poll_expired(cx) {
            Poll::Ready(Some(Ok(expired))) => Poll::Ready(Some(expired.into_inner())),
            Poll::Ready(Some(Err(_))) | Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
