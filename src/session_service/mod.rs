//! Session Service: the handshake and session-lifecycle layer sitting
//! directly on top of the UDP transport.
//!
//! Composes four collaborators — [`crate::session_store::SessionStore`],
//! [`crate::pending_requests::PendingRequestTable`],
//! [`crate::service::Discv5Service`], and a per-peer outbound message
//! queue — and drives them from a single `poll` loop, the same shape as
//! the original `session_service` module's composition of
//! `TimedSessions` + a transport + a libp2p `Stream` impl, rather than a
//! task-per-peer or channel-based design.

mod tests;

use crate::config::Discv5Config;
use crate::crypto::{self, AUTH_TAG_LENGTH};
use crate::error::{Error, Result};
use crate::packet::{AuthHeader, Packet};
use crate::pending_requests::{PendingRequest, PendingRequestTable, HANDSHAKE_REQUEST_ID};
use crate::rpc::{ProtocolMessage, RequestId};
use crate::service::Discv5Service;
use crate::session::{Session, SessionState};
use crate::session_store::SessionStore;
use crate::tag;
use core::pin::Pin;
use enr::{CombinedKey, Enr, NodeId};
use futures::Stream;
use libsecp256k1::SecretKey;
use log::{debug, trace, warn};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::str::FromStr;
use std::task::{Context, Poll};

/// Events the session service surfaces to whatever drives its `poll` loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// A session with this peer just became established *and* trusted.
    Established(Box<Enr<CombinedKey>>),
    /// A decrypted application message arrived on a trusted-established session.
    Message {
        src_id: NodeId,
        src: SocketAddr,
        message: Box<ProtocolMessage>,
    },
    /// An inbound packet could not be attributed to any session; the caller
    /// should issue `send_who_are_you` if it wants to continue talking to
    /// this peer.
    WhoAreYouRequest {
        src_id: NodeId,
        src: SocketAddr,
        auth_tag: [u8; AUTH_TAG_LENGTH],
    },
    /// A pending request was abandoned after exhausting its retries.
    RequestFailed(NodeId, RequestId),
}

/// The handshake + session lifecycle layer. Single-threaded and
/// cooperative: nothing here spawns a task, everything happens inside
/// `poll`.
pub struct SessionService {
    local_enr: Enr<CombinedKey>,
    local_node_id: NodeId,
    local_key: SecretKey,
    config: Discv5Config,
    sessions: SessionStore,
    pending_requests: PendingRequestTable,
    /// Messages queued for a peer while its session is mid-handshake,
    /// flushed in order once the session becomes trusted-established.
    pending_messages: HashMap<NodeId, VecDeque<ProtocolMessage>>,
    transport: Discv5Service,
    events: VecDeque<SessionEvent>,
    stopped: bool,
}

impl SessionService {
    /// Binds the transport and constructs the service. Fails only if the
    /// local key does not match the local ENR's public key, or if binding
    /// the socket fails.
    pub async fn new(
        local_enr: Enr<CombinedKey>,
        local_key: SecretKey,
        socket_addr: SocketAddr,
        config: Discv5Config,
    ) -> Result<Self> {
        let local_public = libsecp256k1::PublicKey::from_secret_key(&local_key);
        if crypto::enr_public_key(&local_enr).ok().as_ref() != Some(&local_public) {
            return Err(Error::KeypairEnrMismatch);
        }
        let local_node_id = local_enr.node_id();
        let transport = Discv5Service::new(socket_addr)
            .await
            .map_err(|source| Error::SocketBind {
                addr: socket_addr,
                source,
            })?;
        Ok(SessionService {
            sessions: SessionStore::new(config.session_timeout),
            pending_requests: PendingRequestTable::new(config.request_timeout),
            pending_messages: HashMap::new(),
            transport,
            local_enr,
            local_node_id,
            local_key,
            config,
            events: VecDeque::new(),
            stopped: false,
        })
    }

    pub fn local_enr(&self) -> &Enr<CombinedKey> {
        &self.local_enr
    }

    /// Detaches the session service: clears all session and pending-request
    /// state so nothing further is sent, and `poll` never yields another
    /// event.
    pub fn stop(&mut self) {
        self.sessions = SessionStore::new(self.config.session_timeout);
        self.pending_requests = PendingRequestTable::new(self.config.request_timeout);
        self.pending_messages.clear();
        self.events.clear();
        self.stopped = true;
    }

    // ---- outbound operations -------------------------------------

    /// Sends `message` to `dst_enr`, starting a session if none exists
    /// yet, buffering the message until the handshake completes.
    pub fn send_request(&mut self, dst_enr: &Enr<CombinedKey>, message: ProtocolMessage) -> Result<()> {
        let dst = dst_enr.udp_socket().ok_or(Error::NoKnownAddress)?;
        let dst_id = dst_enr.node_id();

        match self.sessions.get(&dst_id).map(|s| s.state.clone()) {
            None => {
                self.pending_messages
                    .entry(dst_id.clone())
                    .or_default()
                    .push_back(message);

                let auth_tag = crypto::random_auth_tag();
                let tag = tag::get_tag(&self.local_node_id, &dst_id);
                let random_data = crypto::random_auth_tag().to_vec();
                let packet = Packet::Random {
                    tag,
                    auth_tag,
                    random_data,
                };

                let mut session = Session::new_random_sent(dst_id.clone());
                session.remote_enr = Some(dst_enr.clone());
                session.last_seen_multiaddr = Some(dst);
                self.sessions.insert(dst_id.clone(), session);

                self.pending_requests.insert(
                    dst,
                    HANDSHAKE_REQUEST_ID,
                    PendingRequest {
                        dst_id,
                        dst,
                        packet: packet.clone(),
                        message: None,
                        retries: 0,
                    },
                );
                self.transport.send(dst, packet);
                Ok(())
            }
            Some(SessionState::Established) if self.sessions.get(&dst_id).unwrap().trusted => {
                self.encrypt_and_send(&dst_id, message, true)
            }
            Some(SessionState::Established) => Err(Error::UntrustedPeer),
            Some(_) => Err(Error::SessionNotReady),
        }
    }

    /// Sends `message` to a peer with which a session already exists,
    /// without an ENR to fall back on for starting a new one.
    pub fn send_request_unknown_enr(
        &mut self,
        dst: SocketAddr,
        dst_id: &NodeId,
        message: ProtocolMessage,
    ) -> Result<()> {
        let _ = dst;
        match self.sessions.get(dst_id) {
            None => Err(Error::NoSession),
            Some(session) if session.is_trusted_established() => {
                self.encrypt_and_send(dst_id, message, true)
            }
            Some(session) if session.state == SessionState::Established => Err(Error::UntrustedPeer),
            Some(_) => Err(Error::SessionNotReady),
        }
    }

    /// Sends a response on an already-established session. Responses are
    /// not tracked in the Pending Request Table — there is nothing to
    /// retry a response against.
    pub fn send_response(
        &mut self,
        _dst: SocketAddr,
        dst_id: &NodeId,
        message: ProtocolMessage,
    ) -> Result<()> {
        match self.sessions.get(dst_id) {
            Some(session) if session.state == SessionState::Established => {
                self.encrypt_and_send(dst_id, message, false)
            }
            _ => Err(Error::NoSession),
        }
    }

    /// Issues a WHOAREYOU challenge to an unrecognised peer. Idempotent:
    /// if a session already exists and has progressed past the challenge
    /// stage, this is a silent no-op.
    pub fn send_who_are_you(
        &mut self,
        dst: SocketAddr,
        dst_id: &NodeId,
        enr_seq: u64,
        remote_enr: Option<Enr<CombinedKey>>,
        auth_tag: [u8; AUTH_TAG_LENGTH],
    ) {
        if let Some(session) = self.sessions.get(dst_id) {
            if session.is_trusted_established() || session.state == SessionState::WhoAreYouSent {
                return;
            }
        }

        let id_nonce = crypto::random_id_nonce();
        let mut session = Session::new_who_are_you_sent(dst_id.clone(), id_nonce);
        if let Some(enr) = remote_enr {
            session.remote_enr = Some(enr);
        }
        session.last_seen_multiaddr = Some(dst);
        self.sessions.insert(dst_id.clone(), session);

        let packet = Packet::WhoAreYou {
            token: auth_tag,
            id_nonce,
            // Our last known ENR sequence number for this peer (0 if
            // unknown); lets the peer decide whether to attach a fresh
            // ENR when it completes the handshake.
            enr_seq,
        };
        self.pending_requests.insert(
            dst,
            HANDSHAKE_REQUEST_ID,
            PendingRequest {
                dst_id: dst_id.clone(),
                dst,
                packet: packet.clone(),
                message: None,
                retries: 0,
            },
        );
        self.transport.send(dst, packet);
    }

    // ---- inbound packet dispatch ---------------------------------

    fn handle_inbound(&mut self, from: SocketAddr, packet: Packet) {
        match packet {
            Packet::Random { tag, auth_tag, .. } => self.on_random(from, tag, auth_tag),
            Packet::WhoAreYou {
                token,
                id_nonce,
                enr_seq,
            } => self.on_who_are_you(from, token, id_nonce, enr_seq),
            Packet::AuthMessage {
                tag,
                auth_header,
                message,
            } => self.on_auth_message(from, tag, auth_header, message),
            Packet::Message {
                tag,
                auth_tag,
                message,
            } => self.on_message(from, tag, auth_tag, message),
        }
    }

    /// An inbound `Random` packet never carries enough to identify a
    /// session on its own (that's the point — it's sent before any
    /// session exists); surface it as an unrecognised peer so the caller
    /// can decide whether to challenge it.
    fn on_random(&mut self, from: SocketAddr, tag: [u8; 32], auth_tag: [u8; AUTH_TAG_LENGTH]) {
        let src_id = tag::get_src_id(&self.local_node_id, &tag);
        self.events.push_back(SessionEvent::WhoAreYouRequest {
            src_id,
            src: from,
            auth_tag,
        });
    }

    fn on_who_are_you(
        &mut self,
        from: SocketAddr,
        token: [u8; AUTH_TAG_LENGTH],
        id_nonce: [u8; crypto::ID_NONCE_LENGTH],
        enr_seq: u64,
    ) {
        let request_id = match self.pending_requests.find_by_token(&from, &token) {
            Some(id) => id,
            None => {
                debug!("dropping WHOAREYOU from {from}: no matching outstanding request");
                return;
            }
        };
        let pending = match self.pending_requests.remove(&from, request_id) {
            Some(pending) => pending,
            None => return,
        };
        let dst_id = pending.dst_id;

        let message = match &pending.packet {
            Packet::Random { .. } => self
                .pending_messages
                .get_mut(&dst_id)
                .and_then(|queue| queue.pop_front()),
            _ => pending.message.clone(),
        };
        let message = match message {
            Some(message) => message,
            None => {
                if matches!(pending.packet, Packet::Random { .. }) {
                    trace!("WHOAREYOU from {from} but nothing queued to send it yet");
                } else {
                    warn!("WHOAREYOU from {from} challenged a tracked message with none queued; dropping");
                }
                return;
            }
        };

        let session = match self.sessions.get_mut(&dst_id) {
            Some(session) => session,
            None => {
                warn!("WHOAREYOU from {from} for {dst_id} with no session on record");
                return;
            }
        };
        session.last_seen_multiaddr = Some(from);

        let remote_enr = match session.remote_enr.clone() {
            Some(enr) => enr,
            None => {
                warn!("cannot complete handshake with {dst_id}: no cached ENR");
                self.pending_messages
                    .entry(dst_id)
                    .or_default()
                    .push_front(message);
                return;
            }
        };
        let remote_public = match crypto::enr_public_key(&remote_enr) {
            Ok(key) => key,
            Err(_) => {
                warn!("cannot complete handshake with {dst_id}: malformed ENR public key");
                self.pending_messages
                    .entry(dst_id)
                    .or_default()
                    .push_front(message);
                return;
            }
        };

        let (ephemeral_secret, ephemeral_public) = crypto::generate_ephemeral_keypair();
        let (initiator_key, responder_key) = match crypto::derive_keys(
            &ephemeral_secret,
            &remote_public,
            &self.local_node_id,
            &dst_id,
            &id_nonce,
        ) {
            Ok(keys) => keys,
            Err(_) => {
                warn!("key derivation failed completing handshake with {dst_id}");
                self.pending_messages
                    .entry(dst_id)
                    .or_default()
                    .push_front(message);
                return;
            }
        };

        {
            let session = self.sessions.get_mut(&dst_id).expect("just looked up above");
            session.outbound_key = Some(initiator_key);
            session.inbound_key = Some(responder_key);
            session.state = SessionState::AwaitingResponse;
            session.handshake = None;
        }

        let signature = crypto::sign_id_nonce(&self.local_key, &id_nonce);
        let mut auth_response = Vec::new();
        auth_response.extend_from_slice(&(signature.len() as u16).to_be_bytes());
        auth_response.extend_from_slice(&signature);
        if enr_seq < self.local_enr.seq() {
            let enr_bytes = self.local_enr.to_base64().into_bytes();
            auth_response.extend_from_slice(&(enr_bytes.len() as u16).to_be_bytes());
            auth_response.extend_from_slice(&enr_bytes);
        }

        let fresh_auth_tag = crypto::random_auth_tag();
        let wire_tag = tag::get_tag(&self.local_node_id, &dst_id);
        let plaintext = message.encode();
        let encrypted_message = match crypto::encrypt_message(&initiator_key, &fresh_auth_tag, &plaintext, &wire_tag) {
            Ok(ct) => ct,
            Err(_) => {
                warn!("failed to encrypt AuthMessage body for {dst_id}");
                self.pending_messages
                    .entry(dst_id.clone())
                    .or_default()
                    .push_front(message);
                return;
            }
        };

        let packet = Packet::AuthMessage {
            tag: wire_tag,
            auth_header: AuthHeader {
                auth_tag: fresh_auth_tag,
                id_nonce,
                auth_scheme_name: "gcm".to_string(),
                ephemeral_pubkey: ephemeral_public.serialize_compressed().to_vec(),
                auth_response,
            },
            message: encrypted_message,
        };

        self.pending_requests.insert(
            from,
            message.id,
            PendingRequest {
                dst_id: dst_id.clone(),
                dst: from,
                packet: packet.clone(),
                message: Some(message),
                retries: 0,
            },
        );
        self.transport.send(from, packet);

        self.flush_pending_messages(&dst_id);
    }

    fn on_auth_message(
        &mut self,
        from: SocketAddr,
        wire_tag: [u8; 32],
        auth_header: AuthHeader,
        message: Vec<u8>,
    ) {
        let src_id = tag::get_src_id(&self.local_node_id, &wire_tag);

        match self.sessions.get(&src_id).map(|s| s.state.clone()) {
            Some(SessionState::WhoAreYouSent) => {}
            _ => {
                debug!("dropping AuthMessage from {from}: no outstanding WHOAREYOU for {src_id}");
                return;
            }
        }
        let request_id = match self.pending_requests.find_who_are_you(&from, &src_id) {
            Some(id) => id,
            None => {
                debug!("dropping AuthMessage from {from}: no tracked WHOAREYOU request");
                return;
            }
        };
        self.pending_requests.remove(&from, request_id);

        let id_nonce = match self
            .sessions
            .get(&src_id)
            .and_then(|s| s.handshake.as_ref())
            .map(|h| h.id_nonce)
        {
            Some(nonce) => nonce,
            None => return,
        };

        let embedded_enr = decode_embedded_enr(&auth_header.auth_response);
        let remote_enr = match self
            .sessions
            .get(&src_id)
            .and_then(|s| s.remote_enr.clone())
            .or(embedded_enr)
        {
            Some(enr) => enr,
            None => {
                warn!("cannot verify handshake with {src_id}: no ENR known or offered");
                self.sessions.remove(&src_id);
                self.pending_messages.remove(&src_id);
                return;
            }
        };

        let signature = decode_embedded_signature(&auth_header.auth_response);
        let remote_public_for_verify = match crypto::enr_public_key(&remote_enr) {
            Ok(key) => key,
            Err(_) => {
                self.sessions.remove(&src_id);
                self.pending_messages.remove(&src_id);
                return;
            }
        };
        let signature_valid = signature
            .map(|sig| crypto::verify_id_nonce_signature(&remote_public_for_verify, &id_nonce, &sig))
            .unwrap_or(false);
        if !signature_valid {
            warn!("id-nonce signature verification failed for {src_id}");
            self.sessions.remove(&src_id);
            self.pending_messages.remove(&src_id);
            return;
        }

        let remote_ephemeral = match libsecp256k1::PublicKey::parse_slice(&auth_header.ephemeral_pubkey) {
            Ok(key) => key,
            Err(_) => {
                self.sessions.remove(&src_id);
                self.pending_messages.remove(&src_id);
                return;
            }
        };
        let (initiator_key, responder_key) = match crypto::derive_keys(
            &self.local_key,
            &remote_ephemeral,
            &src_id,
            &self.local_node_id,
            &id_nonce,
        ) {
            Ok(keys) => keys,
            Err(_) => {
                self.sessions.remove(&src_id);
                self.pending_messages.remove(&src_id);
                return;
            }
        };

        {
            let session = self.sessions.get_mut(&src_id).expect("checked above");
            session.inbound_key = Some(initiator_key);
            session.outbound_key = Some(responder_key);
            session.remote_enr = Some(remote_enr.clone());
            session.last_seen_multiaddr = Some(from);
            session.state = SessionState::Established;
            session.handshake = None;
            session.update_trust();
        }

        self.sessions.extend_timeout(&src_id, self.config.session_timeout);

        let trusted = self
            .sessions
            .get(&src_id)
            .map(|s| s.is_trusted_established())
            .unwrap_or(false);
        if trusted {
            self.events
                .push_back(SessionEvent::Established(Box::new(remote_enr)));
            self.flush_pending_messages(&src_id);
        }

        self.on_message(from, wire_tag, auth_header.auth_tag, message);
    }

    fn on_message(&mut self, from: SocketAddr, wire_tag: [u8; 32], auth_tag: [u8; AUTH_TAG_LENGTH], message: Vec<u8>) {
        let src_id = tag::get_src_id(&self.local_node_id, &wire_tag);

        let state = match self.sessions.get(&src_id).map(|s| s.state.clone()) {
            None => {
                self.events.push_back(SessionEvent::WhoAreYouRequest {
                    src_id,
                    src: from,
                    auth_tag,
                });
                return;
            }
            Some(SessionState::WhoAreYouSent) => {
                // We challenged this peer and are waiting on their AuthMessage;
                // an ordinary Message in the meantime is stale or out of order.
                return;
            }
            Some(state) => state,
        };

        if state == SessionState::RandomSent {
            self.events.push_back(SessionEvent::WhoAreYouRequest {
                src_id: src_id.clone(),
                src: from,
                auth_tag,
            });
        }
        let was_awaiting = state == SessionState::AwaitingResponse;

        let inbound_key = self.sessions.get(&src_id).and_then(|s| s.inbound_key);
        let plaintext = match inbound_key.and_then(|key| crypto::decrypt_message(&key, &auth_tag, &message, &wire_tag).ok()) {
            Some(plaintext) => plaintext,
            None => {
                self.sessions.remove(&src_id);
                if let Some(messages) = self.pending_messages.remove(&src_id) {
                    for message in messages {
                        self.events
                            .push_back(SessionEvent::RequestFailed(src_id.clone(), message.id));
                    }
                }
                self.events.push_back(SessionEvent::WhoAreYouRequest {
                    src_id,
                    src: from,
                    auth_tag,
                });
                return;
            }
        };

        let protocol_message = match ProtocolMessage::decode(&plaintext) {
            Ok(message) => message,
            Err(_) => {
                debug!("dropping malformed message body from {from}");
                return;
            }
        };

        self.pending_requests.remove(&from, protocol_message.id);

        let trust_flipped = {
            let session = self.sessions.get_mut(&src_id).expect("matched above");
            session.last_seen_multiaddr = Some(from);
            session.update_trust()
        };
        if self
            .sessions
            .get(&src_id)
            .map(|s| s.is_trusted_established())
            .unwrap_or(false)
            && (trust_flipped || was_awaiting)
        {
            if let Some(enr) = self.sessions.get(&src_id).and_then(|s| s.remote_enr.clone()) {
                self.events
                    .push_back(SessionEvent::Established(Box::new(enr)));
            }
            self.flush_pending_messages(&src_id);
        }

        self.events.push_back(SessionEvent::Message {
            src_id,
            src: from,
            message: Box::new(protocol_message),
        });
    }

    // ---- shared helpers -----------------------------------------------

    fn encrypt_and_send(&mut self, dst_id: &NodeId, message: ProtocolMessage, track: bool) -> Result<()> {
        let session = self.sessions.get(dst_id).ok_or(Error::NoSession)?;
        let dst = session
            .last_seen_multiaddr
            .or_else(|| session.remote_enr.as_ref().and_then(|enr| enr.udp_socket()))
            .ok_or(Error::NoKnownAddress)?;
        let outbound_key = session.outbound_key.ok_or(Error::SessionNotReady)?;

        let auth_tag = crypto::random_auth_tag();
        let wire_tag = tag::get_tag(&self.local_node_id, dst_id);
        let ciphertext = crypto::encrypt_message(&outbound_key, &auth_tag, &message.encode(), &wire_tag)?;
        let packet = Packet::Message {
            tag: wire_tag,
            auth_tag,
            message: ciphertext,
        };

        if track {
            self.pending_requests.insert(
                dst,
                message.id,
                PendingRequest {
                    dst_id: dst_id.clone(),
                    dst,
                    packet: packet.clone(),
                    message: Some(message),
                    retries: 0,
                },
            );
        }
        self.transport.send(dst, packet);
        Ok(())
    }

    /// Sends every message buffered for `node_id` once its session is
    /// trusted-established, in FIFO order.
    fn flush_pending_messages(&mut self, node_id: &NodeId) {
        let trusted = self
            .sessions
            .get(node_id)
            .map(|s| s.is_trusted_established())
            .unwrap_or(false);
        if !trusted {
            return;
        }
        let messages: Vec<_> = match self.pending_messages.get_mut(node_id) {
            Some(queue) => queue.drain(..).collect(),
            None => return,
        };
        for message in messages {
            if let Err(err) = self.encrypt_and_send(node_id, message, true) {
                warn!("failed to flush buffered message to {node_id}: {err}");
            }
        }
    }

    /// Applies the retry/abandon policy to a request whose
    /// retransmission timer fired.
    fn handle_request_timeout(&mut self, dst: SocketAddr, request_id: RequestId) {
        let pending = match self.pending_requests.get(&dst, request_id) {
            Some(pending) => pending.clone(),
            None => return,
        };

        if pending.retries < self.config.request_retries {
            self.transport.send(dst, pending.packet.clone());
            self.pending_requests.bump_retries(&dst, request_id);
            self.pending_requests.rearm(&dst, request_id);
            return;
        }

        self.pending_requests.remove(&dst, request_id);
        if pending.is_handshake_packet() {
            warn!("handshake with {} abandoned after exhausting retries", pending.dst_id);
            self.sessions.remove(&pending.dst_id);
            if let Some(messages) = self.pending_messages.remove(&pending.dst_id) {
                for message in messages {
                    self.events
                        .push_back(SessionEvent::RequestFailed(pending.dst_id.clone(), message.id));
                }
            }
        } else {
            self.events
                .push_back(SessionEvent::RequestFailed(pending.dst_id, request_id));
        }
    }

    /// Consults the Pending Request Table for `node_id` and either extends
    /// the session's timeout (a request is still outstanding) or reaps the
    /// session and fails its buffered messages.
    fn handle_session_timeout(&mut self, node_id: NodeId) {
        let has_pending = self
            .pending_requests
            .requests_outstanding_for(&node_id);
        if has_pending {
            self.sessions.extend_timeout(&node_id, self.config.session_timeout);
            return;
        }
        self.sessions.remove(&node_id);
        if let Some(messages) = self.pending_messages.remove(&node_id) {
            for message in messages {
                self.events
                    .push_back(SessionEvent::RequestFailed(node_id.clone(), message.id));
            }
        }
    }

    /// Drives the service: processes transport input, request timeouts,
    /// and session timeouts until an event is ready or every sub-stream is
    /// pending.
    pub fn poll(&mut self, cx: &mut Context<'_>) -> Poll<SessionEvent> {
        if self.stopped {
            return Poll::Pending;
        }
        loop {
            if let Some(event) = self.events.pop_front() {
                return Poll::Ready(event);
            }

            if let Poll::Ready(Some((src, packet))) = Pin::new(&mut self.transport).poll_next(cx) {
                self.handle_inbound(src, packet);
                continue;
            }

            if let Poll::Ready(Some((dst, request_id))) = Pin::new(&mut self.pending_requests).poll_next(cx) {
                self.handle_request_timeout(dst, request_id);
                continue;
            }

            if let Poll::Ready(Some(node_id)) = Pin::new(&mut self.sessions).poll_next(cx) {
                self.handle_session_timeout(node_id);
                continue;
            }

            return Poll::Pending;
        }
    }
}

fn decode_embedded_signature(auth_response: &[u8]) -> Option<Vec<u8>> {
    if auth_response.len() < 2 {
        return None;
    }
    let sig_len = u16::from_be_bytes([auth_response[0], auth_response[1]]) as usize;
    auth_response.get(2..2 + sig_len).map(|s| s.to_vec())
}

fn decode_embedded_enr(auth_response: &[u8]) -> Option<Enr<CombinedKey>> {
    if auth_response.len() < 2 {
        return None;
    }
    let sig_len = u16::from_be_bytes([auth_response[0], auth_response[1]]) as usize;
    let rest = auth_response.get(2 + sig_len..)?;
    if rest.len() < 2 {
        return None;
    }
    let enr_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
    let enr_bytes = rest.get(2..2 + enr_len)?;
    let text = std::str::from_utf8(enr_bytes).ok()?;
    Enr::from_str(text).ok()
}
